//! Request Router
//!
//! Serves GetKey/PutKey/DeleteKey by executing locally when this node is
//! the key's primary, forwarding to the primary otherwise, and fanning
//! primary writes out to live replicas on a best-effort basis.

use std::sync::Arc;
use std::time::Duration;
use futures::stream::{self, StreamExt};

use super::protocol::{ErrorCode, Lookup, Message, SERVING};
use crate::cluster::{ClusterTable, NodeId};
use crate::error::{Error, Result};
use crate::network::{RequestHandler, Transport};
use crate::state::{LocalStore, PeerStatus, PeerTable};

/// Router timing and fan-out limits
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Deadline for requests forwarded to a primary
    pub forward_timeout: Duration,
    /// Deadline for each replica write
    pub replica_timeout: Duration,
    /// Maximum replica writes in flight at once
    pub replica_fanout: usize,
}

/// Acknowledgement of a PutKey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutAck {
    pub code: i32,
    pub message: String,
}

/// Outcome of a replica fan-out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Replicas that acknowledged
    pub succeeded: usize,
    /// Other nodes in the cluster
    pub total: usize,
}

/// Request router and replication coordinator
pub struct Router {
    node_id: NodeId,
    cluster: Arc<ClusterTable>,
    store: Arc<LocalStore>,
    peers: Arc<PeerTable>,
    transport: Arc<dyn Transport>,
    config: RouterConfig,
}

impl Router {
    /// Create a new router
    pub fn new(
        node_id: NodeId,
        cluster: Arc<ClusterTable>,
        store: Arc<LocalStore>,
        peers: Arc<PeerTable>,
        transport: Arc<dyn Transport>,
        config: RouterConfig,
    ) -> Self {
        Self {
            node_id,
            cluster,
            store,
            peers,
            transport,
            config,
        }
    }

    /// Get the node ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Read a key
    pub async fn get_key(&self, key: &str) -> Result<Lookup> {
        let primary = self.cluster.primary_of(key)?;

        if primary == self.node_id {
            return Ok(self.store.get(key).await.into());
        }

        let request = Message::GetKey {
            key: key.to_string(),
        };
        match self.forward(primary, request).await? {
            Message::Value { value } => Ok(value),
            other => Err(Error::UnexpectedResponse {
                expected: "Value",
                got: other.type_name(),
            }),
        }
    }

    /// Write a key
    pub async fn put_key(&self, key: &str, value: &str, is_replica: bool) -> Result<PutAck> {
        if is_replica {
            self.store.put(key, value).await?;
            tracing::debug!("Applied replica write for '{}'", key);
            return Ok(PutAck {
                code: 0,
                message: format!("Stored (replica): {}", key),
            });
        }

        let primary = self.cluster.primary_of(key)?;

        if primary != self.node_id {
            let request = Message::PutKey {
                key: key.to_string(),
                value: value.to_string(),
                is_replica: false,
            };
            return match self.forward(primary, request).await? {
                Message::PutKeyReturn { code, message } => Ok(PutAck { code, message }),
                other => Err(Error::UnexpectedResponse {
                    expected: "PutKeyReturn",
                    got: other.type_name(),
                }),
            };
        }

        // Committed once persisted locally; replication cannot undo it
        self.store.put(key, value).await?;

        let report = self
            .replicate(key, || Message::PutKey {
                key: key.to_string(),
                value: value.to_string(),
                is_replica: true,
            })
            .await;

        Ok(PutAck {
            code: 0,
            message: format!(
                "Stored (primary): {}. Replicated to {}/{} replicas.",
                key, report.succeeded, report.total
            ),
        })
    }

    /// Delete a key
    pub async fn delete_key(&self, key: &str, is_replica: bool) -> Result<String> {
        if is_replica {
            self.store.delete(key).await?;
            tracing::debug!("Applied replica delete for '{}'", key);
            return Ok(format!("Delete for '{}' applied on replica.", key));
        }

        let primary = self.cluster.primary_of(key)?;

        if primary != self.node_id {
            let request = Message::DeleteKey {
                key: key.to_string(),
                is_replica: false,
            };
            return match self.forward(primary, request).await? {
                Message::DeleteKeyReturn { message } => Ok(message),
                other => Err(Error::UnexpectedResponse {
                    expected: "DeleteKeyReturn",
                    got: other.type_name(),
                }),
            };
        }

        let existed = self.store.delete(key).await?;
        if !existed {
            return Ok(format!(
                "Key '{}' did not exist (primary). Replicated to 0/0 replicas.",
                key
            ));
        }

        let report = self
            .replicate(key, || Message::DeleteKey {
                key: key.to_string(),
                is_replica: true,
            })
            .await;

        Ok(format!(
            "Key '{}' deleted (primary). Replicated to {}/{} replicas.",
            key, report.succeeded, report.total
        ))
    }

    /// Serialize the whole local store
    pub async fn full_snapshot(&self) -> Result<String> {
        let data_json = self.store.snapshot_json().await?;
        tracing::info!(
            "Serving full snapshot from node {} ({} bytes)",
            self.node_id,
            data_json.len()
        );
        Ok(data_json)
    }

    /// Liveness status; independent of store and replication state
    pub fn check_health(&self) -> &'static str {
        SERVING
    }

    /// Forward a request to the key's primary, failing fast if it is known down
    async fn forward(&self, primary: &str, request: Message) -> Result<Message> {
        let address = self.cluster.address_of(primary).ok_or_else(|| {
            Error::Config(format!("no address for node {} in cluster table", primary))
        })?;

        let status = self.peers.status_of(primary).await;
        if !status.may_forward() {
            tracing::warn!(
                "{} not forwarded: primary {} is {}",
                request.type_name(),
                primary,
                status
            );
            return Err(Error::Unavailable {
                node_id: primary.to_string(),
                address: address.to_string(),
                status: status.to_string(),
            });
        }

        let type_name = request.type_name();
        tracing::debug!("Forwarding {} to primary {} ({})", type_name, primary, address);

        self.transport
            .call(address, request, self.config.forward_timeout)
            .await
            .map_err(|e| {
                tracing::error!("Forwarding {} to {} failed: {}", type_name, primary, e);
                e
            })
    }

    /// Send a replica-flagged request to every ALIVE peer
    ///
    /// Peers that are not ALIVE are skipped; failures are logged and counted,
    /// never surfaced.
    async fn replicate<F>(&self, key: &str, make_request: F) -> ReplicationReport
    where
        F: Fn() -> Message,
    {
        let mut targets = Vec::new();
        let mut total = 0;

        for (id, address) in self.cluster.peers_of(&self.node_id) {
            total += 1;
            let status = self.peers.status_of(id).await;
            if status != PeerStatus::Alive {
                tracing::warn!(
                    "Skipping replication of '{}' to {} (status: {})",
                    key,
                    id,
                    status
                );
                continue;
            }
            targets.push((id.to_string(), address.to_string(), make_request()));
        }

        let timeout = self.config.replica_timeout;
        let succeeded = stream::iter(targets)
            .map(|(id, address, request)| async move {
                let type_name = request.type_name();
                match self.transport.call(&address, request, timeout).await {
                    Ok(_) => true,
                    Err(e) => {
                        tracing::warn!(
                            "Replica {} of '{}' to {} failed: {}",
                            type_name,
                            key,
                            id,
                            e
                        );
                        false
                    }
                }
            })
            .buffer_unordered(self.config.replica_fanout)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;

        ReplicationReport { succeeded, total }
    }
}

#[async_trait::async_trait]
impl RequestHandler for Router {
    async fn handle(&self, peer_addr: &str, message: Message) -> Message {
        tracing::debug!("{} from {}", message.type_name(), peer_addr);

        let result = match message {
            Message::GetKey { key } => self
                .get_key(&key)
                .await
                .map(|value| Message::Value { value }),
            Message::PutKey {
                key,
                value,
                is_replica,
            } => self
                .put_key(&key, &value, is_replica)
                .await
                .map(|ack| Message::PutKeyReturn {
                    code: ack.code,
                    message: ack.message,
                }),
            Message::DeleteKey { key, is_replica } => self
                .delete_key(&key, is_replica)
                .await
                .map(|message| Message::DeleteKeyReturn { message }),
            Message::RequestFullSnapshot => self
                .full_snapshot()
                .await
                .map(|data_json| Message::FullSnapshot { data_json }),
            Message::CheckHealth => Ok(Message::Health {
                status: self.check_health().to_string(),
            }),
            other => Ok(Message::Error {
                code: ErrorCode::InvalidRequest,
                message: format!("{} is not a request", other.type_name()),
            }),
        };

        result.unwrap_or_else(|e| Message::from_error(&e))
    }
}
