//! In-process transport for tests
//!
//! Routes calls to handlers registered under an address, records every
//! call, and can take addresses "down" to simulate failed peers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{RequestHandler, Transport};
use crate::error::{Error, Result};
use crate::replication::Message;

type Scripted = Arc<dyn Fn(Message) -> Result<Message> + Send + Sync>;

#[derive(Clone)]
enum Endpoint {
    Handler(Arc<dyn RequestHandler>),
    Scripted(Scripted),
}

#[derive(Default)]
pub(crate) struct LoopbackTransport {
    endpoints: Mutex<HashMap<String, Endpoint>>,
    down: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, Message)>>,
}

impl LoopbackTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Route calls for `address` to a request handler
    pub(crate) fn register(&self, address: &str, handler: Arc<dyn RequestHandler>) {
        self.endpoints
            .lock()
            .unwrap()
            .insert(address.to_string(), Endpoint::Handler(handler));
    }

    /// Answer calls for `address` with a fixed function
    pub(crate) fn script<F>(&self, address: &str, f: F)
    where
        F: Fn(Message) -> Result<Message> + Send + Sync + 'static,
    {
        self.endpoints
            .lock()
            .unwrap()
            .insert(address.to_string(), Endpoint::Scripted(Arc::new(f)));
    }

    /// Make calls to `address` fail as if the peer were unreachable
    pub(crate) fn set_down(&self, address: &str, down: bool) {
        let mut set = self.down.lock().unwrap();
        if down {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    /// Every call made so far
    pub(crate) fn calls(&self) -> Vec<(String, Message)> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made to one address
    pub(crate) fn calls_to(&self, address: &str) -> Vec<Message> {
        self.calls()
            .into_iter()
            .filter(|(addr, _)| addr == address)
            .map(|(_, msg)| msg)
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl Transport for LoopbackTransport {
    async fn call(&self, address: &str, message: Message, deadline: Duration) -> Result<Message> {
        self.calls
            .lock()
            .unwrap()
            .push((address.to_string(), message.clone()));

        if self.down.lock().unwrap().contains(address) {
            return Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: "connection refused".into(),
            });
        }

        let endpoint = self.endpoints.lock().unwrap().get(address).cloned();
        let response = match endpoint {
            Some(Endpoint::Handler(handler)) => {
                match tokio::time::timeout(deadline, handler.handle("loopback", message)).await {
                    Ok(response) => response,
                    Err(_) => return Err(Error::ConnectionTimeout(address.to_string())),
                }
            }
            Some(Endpoint::Scripted(f)) => f(message)?,
            None => {
                return Err(Error::ConnectionFailed {
                    address: address.to_string(),
                    reason: "no route".into(),
                })
            }
        };

        match response {
            Message::Error { code, message } => Err(Error::Remote { code, message }),
            other => Ok(other),
        }
    }
}
