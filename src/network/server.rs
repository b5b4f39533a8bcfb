//! Network Server
//!
//! TCP server accepting requests from peers and clients.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use super::{read_message, write_message};
use crate::error::{Error, Result};
use crate::replication::{ErrorCode, Message};

/// Serves one request and produces its response
#[async_trait::async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request from `peer_addr`
    async fn handle(&self, peer_addr: &str, message: Message) -> Message;
}

/// Network server for cluster communication
pub struct NetworkServer {
    /// Bound listener
    listener: TcpListener,
    /// Worker pool: one permit per in-flight request
    workers: Arc<Semaphore>,
}

impl NetworkServer {
    /// Bind the listening socket
    pub async fn bind(bind_address: &str, max_in_flight: usize) -> Result<Self> {
        let listener = TcpListener::bind(bind_address).await?;
        tracing::info!("Network server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            workers: Arc::new(Semaphore::new(max_in_flight)),
        })
    }

    /// Actual bound address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the shutdown flag flips to true
    pub async fn serve(
        self,
        handler: Arc<dyn RequestHandler>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((socket, addr)) => {
                            let peer_addr = addr.to_string();
                            let handler = Arc::clone(&handler);
                            let workers = Arc::clone(&self.workers);

                            tokio::spawn(async move {
                                let result =
                                    handle_connection(socket, peer_addr.clone(), handler, workers)
                                        .await;
                                if let Err(e) = result {
                                    tracing::warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!("Accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Network server stopped");
        Ok(())
    }
}

/// Handle a single connection, which may carry several requests in sequence
async fn handle_connection(
    socket: TcpStream,
    peer_addr: String,
    handler: Arc<dyn RequestHandler>,
    workers: Arc<Semaphore>,
) -> Result<()> {
    socket.set_nodelay(true)?;
    let (mut reader, mut writer) = socket.into_split();

    loop {
        match read_message(&mut reader).await {
            Ok(message) => {
                tracing::trace!("Received {} from {}", message.type_name(), peer_addr);

                // Liveness probes never wait for a worker
                let response = if matches!(message, Message::CheckHealth) {
                    handler.handle(&peer_addr, message).await
                } else if message.is_request() {
                    let _permit = workers
                        .acquire()
                        .await
                        .map_err(|_| Error::ShuttingDown)?;
                    handler.handle(&peer_addr, message).await
                } else {
                    Message::Error {
                        code: ErrorCode::InvalidRequest,
                        message: format!("{} is not a request", message.type_name()),
                    }
                };

                write_message(&mut writer, &response).await?;
            }
            Err(Error::Io(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Connection closed
                break;
            }
            Err(e) => {
                tracing::warn!("Error reading message from {}: {}", peer_addr, e);
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkClient;
    use crate::replication::SERVING;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoHealth {
        served: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RequestHandler for EchoHealth {
        async fn handle(&self, _peer_addr: &str, message: Message) -> Message {
            self.served.fetch_add(1, Ordering::SeqCst);
            match message {
                Message::CheckHealth => Message::Health {
                    status: SERVING.to_string(),
                },
                Message::GetKey { key } => Message::Error {
                    code: ErrorCode::Internal,
                    message: format!("no store for {}", key),
                },
                other => Message::Error {
                    code: ErrorCode::InvalidRequest,
                    message: other.type_name().to_string(),
                },
            }
        }
    }

    async fn start_server() -> (String, Arc<EchoHealth>, watch::Sender<bool>) {
        let server = NetworkServer::bind("127.0.0.1:0", 4).await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        let handler = Arc::new(EchoHealth {
            served: AtomicUsize::new(0),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dyn_handler: Arc<dyn RequestHandler> = handler.clone();
        tokio::spawn(server.serve(dyn_handler, shutdown_rx));
        (address, handler, shutdown_tx)
    }

    #[tokio::test]
    async fn test_request_response_over_tcp() {
        let (address, handler, shutdown_tx) = start_server().await;
        let client = NetworkClient::new();

        let response = client
            .send(&address, Message::CheckHealth, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            response,
            Message::Health {
                status: SERVING.to_string()
            }
        );
        assert_eq!(handler.served.load(Ordering::SeqCst), 1);

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_error_reply_becomes_remote_error() {
        let (address, _handler, shutdown_tx) = start_server().await;
        let client = NetworkClient::new();

        let result = client
            .send(&address, Message::GetKey { key: "k".into() }, Duration::from_secs(2))
            .await;
        match result {
            Err(Error::Remote { code, message }) => {
                assert_eq!(code, ErrorCode::Internal);
                assert_eq!(message, "no store for k");
            }
            other => panic!("expected remote error, got {:?}", other),
        }

        let _ = shutdown_tx.send(true);
    }

    #[tokio::test]
    async fn test_response_messages_are_rejected() {
        let (address, handler, shutdown_tx) = start_server().await;
        let client = NetworkClient::new();

        let result = client
            .send(
                &address,
                Message::Health {
                    status: SERVING.to_string(),
                },
                Duration::from_secs(2),
            )
            .await;
        assert!(matches!(
            result,
            Err(Error::Remote {
                code: ErrorCode::InvalidRequest,
                ..
            })
        ));
        assert_eq!(handler.served.load(Ordering::SeqCst), 0);

        let _ = shutdown_tx.send(true);
    }
}
