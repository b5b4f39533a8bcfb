//! Network Client
//!
//! TCP client for calling other nodes.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{read_message, write_message, Transport};
use crate::error::{Error, Result};
use crate::replication::Message;

/// Network client for calling peer nodes
///
/// Opens a fresh connection per call; the whole exchange (connect, write,
/// read) is bounded by the caller's deadline.
#[derive(Debug, Clone, Default)]
pub struct NetworkClient;

impl NetworkClient {
    /// Create a new network client
    pub fn new() -> Self {
        Self
    }

    /// Send a message to a peer and wait for its response
    pub async fn send(
        &self,
        address: &str,
        message: Message,
        deadline: Duration,
    ) -> Result<Message> {
        let result = timeout(deadline, self.send_inner(address, message)).await;

        match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Send without timeout wrapper
    async fn send_inner(&self, address: &str, message: Message) -> Result<Message> {
        let mut stream = self.connect(address).await?;
        let (mut reader, mut writer) = stream.split();

        write_message(&mut writer, &message)
            .await
            .map_err(|e| broken_exchange(address, e))?;
        let response = read_message(&mut reader)
            .await
            .map_err(|e| broken_exchange(address, e))?;

        tracing::trace!(
            "{} -> {} answered with {}",
            message.type_name(),
            address,
            response.type_name()
        );

        match response {
            Message::Error { code, message } => Err(Error::Remote { code, message }),
            other => Ok(other),
        }
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        match TcpStream::connect(address).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Err(e) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// A peer closing or resetting the socket mid-exchange is a failure to reach it
fn broken_exchange(address: &str, err: Error) -> Error {
    match err {
        Error::Io(e) => Error::ConnectionFailed {
            address: address.to_string(),
            reason: e.to_string(),
        },
        other => other,
    }
}

#[async_trait::async_trait]
impl Transport for NetworkClient {
    async fn call(&self, address: &str, message: Message, deadline: Duration) -> Result<Message> {
        self.send(address, message, deadline).await
    }
}
