//! Node
//!
//! Owns every per-node component and drives the process lifecycle.

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};

use crate::api::{AppState, HttpServer};
use crate::cluster::{ClusterTable, NodeId};
use crate::config::KvMeshConfig;
use crate::error::{Error, Result};
use crate::network::{NetworkClient, NetworkServer, RequestHandler, Transport};
use crate::replication::{RecoveryManager, Router, RouterConfig};
use crate::state::{HealthMonitor, LocalStore, MonitorConfig, PeerTable};

/// Process lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle {
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Starting => write!(f, "starting"),
            Lifecycle::Running => write!(f, "running"),
            Lifecycle::Stopping => write!(f, "stopping"),
        }
    }
}

/// A single storage node
pub struct KvNode {
    node_id: NodeId,
    port: u16,
    config: KvMeshConfig,
    cluster: Arc<ClusterTable>,
    store: Arc<LocalStore>,
    peers: Arc<PeerTable>,
    transport: Arc<dyn Transport>,
    router: Arc<Router>,
    lifecycle: Arc<RwLock<Lifecycle>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl KvNode {
    /// Build a node that talks to its peers over TCP
    pub fn new(config: KvMeshConfig, node_id: &str) -> Result<Self> {
        Self::with_transport(config, node_id, Arc::new(NetworkClient::new()))
    }

    /// Build a node with a custom transport
    pub fn with_transport(
        config: KvMeshConfig,
        node_id: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;

        let cluster = Arc::new(ClusterTable::from_config(&config.cluster)?);
        let port = cluster.port_of(node_id).ok_or_else(|| {
            Error::Config(format!("node {} has no usable port in the cluster table", node_id))
        })?;

        let store = Arc::new(LocalStore::open(LocalStore::snapshot_path(
            config.data_dir(),
            node_id,
        ))?);
        let peers = Arc::new(PeerTable::new(node_id, &cluster));

        let router = Arc::new(Router::new(
            node_id.to_string(),
            Arc::clone(&cluster),
            Arc::clone(&store),
            Arc::clone(&peers),
            Arc::clone(&transport),
            RouterConfig {
                forward_timeout: config.forward_timeout(),
                replica_timeout: config.replica_timeout(),
                replica_fanout: config.rpc.replica_fanout,
            },
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            node_id: node_id.to_string(),
            port,
            config,
            cluster,
            store,
            peers,
            transport,
            router,
            lifecycle: Arc::new(RwLock::new(Lifecycle::Starting)),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Get the node ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Address the RPC listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.config.node.bind_host, self.port)
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub async fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read().await
    }

    /// Ask a running node to stop
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Serve until Ctrl-C or [`KvNode::shutdown`]
    pub async fn run(&self) -> Result<()> {
        let address = self.bind_address();
        let server = match NetworkServer::bind(&address, self.config.node.max_in_flight).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to bind {}: {}", address, e);
                return Err(e);
            }
        };

        let mut tasks = Vec::new();

        // Health monitor
        let monitor = HealthMonitor::new(
            Arc::clone(&self.cluster),
            Arc::clone(&self.peers),
            Arc::clone(&self.transport),
            MonitorConfig {
                initial_delay: self.config.health_initial_delay(),
                interval: self.config.heartbeat_interval(),
                probe_timeout: self.config.probe_timeout(),
            },
        );
        let shutdown_rx = self.shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            monitor.run(shutdown_rx).await;
        }));

        // One-shot recovery
        if self.config.recovery.enabled {
            let recovery = RecoveryManager::new(
                self.node_id.clone(),
                Arc::clone(&self.cluster),
                Arc::clone(&self.store),
                Arc::clone(&self.peers),
                Arc::clone(&self.transport),
                self.config.recovery_delay(),
                self.config.snapshot_timeout(),
            );
            let mut shutdown_rx = self.shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                tokio::select! {
                    outcome = recovery.run() => {
                        tracing::debug!("Recovery finished: {:?}", outcome);
                    }
                    _ = wait_for_shutdown(&mut shutdown_rx) => {}
                }
            }));
        } else {
            tracing::info!("Startup recovery disabled");
        }

        // Status API
        if self.config.api.enabled {
            let api_port = self.port.checked_add(self.config.api.port_offset).ok_or_else(|| {
                Error::Config(format!(
                    "api port {} + {} is out of range",
                    self.port, self.config.api.port_offset
                ))
            })?;
            let api = HttpServer::new(AppState {
                node_id: self.node_id.clone(),
                address: address.clone(),
                lifecycle: Arc::clone(&self.lifecycle),
                store: Arc::clone(&self.store),
                peers: Arc::clone(&self.peers),
            });
            let api_address = format!("{}:{}", self.config.node.bind_host, api_port);
            let shutdown_rx = self.shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = api.start(&api_address, shutdown_rx).await {
                    tracing::error!("HTTP API error: {}", e);
                }
            }));
        }

        let handler: Arc<dyn RequestHandler> = self.router.clone();
        let server_task = tokio::spawn(server.serve(handler, self.shutdown_rx.clone()));

        *self.lifecycle.write().await = Lifecycle::Running;
        tracing::info!(
            "Node {} serving on {} ({} keys, {} peers)",
            self.node_id,
            address,
            self.store.len().await,
            self.peers.len().await
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, shutting down");
            }
            _ = wait_for_shutdown(&mut shutdown_rx) => {
                tracing::info!("Shutdown requested");
            }
        }

        *self.lifecycle.write().await = Lifecycle::Stopping;
        let _ = self.shutdown_tx.send(true);

        match server_task.await {
            Ok(Err(e)) => tracing::warn!("Network server exited with error: {}", e),
            Err(e) => tracing::warn!("Network server task failed: {}", e),
            Ok(Ok(())) => {}
        }
        for task in tasks {
            let _ = task.await;
        }

        if let Err(e) = self.store.persist().await {
            tracing::warn!("Final persist failed: {}", e);
        }

        tracing::info!("Node {} stopped", self.node_id);
        Ok(())
    }
}

/// Resolve once the shutdown flag is true (or the sender is gone)
pub(crate) async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::{Lookup, Message};
    use crate::state::parse_snapshot;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn single_node_config(dir: &tempfile::TempDir, port: u16) -> KvMeshConfig {
        let mut config = KvMeshConfig::default();
        config.node.bind_host = "127.0.0.1".into();
        config.node.data_dir = dir.path().to_path_buf();
        config.cluster.nodes = BTreeMap::from([(
            "node1".to_string(),
            format!("127.0.0.1:{}", port),
        )]);
        config.recovery.delay_ms = 10;
        config
    }

    #[test]
    fn test_unknown_node_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = single_node_config(&dir, 50051);
        assert!(matches!(
            KvNode::new(config, "node9"),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_serves_over_tcp_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let node = Arc::new(KvNode::new(single_node_config(&dir, port), "node1").unwrap());
        assert_eq!(node.lifecycle().await, Lifecycle::Starting);

        let handle = {
            let node = Arc::clone(&node);
            tokio::spawn(async move { node.run().await })
        };

        let client = NetworkClient::new();
        let address = format!("127.0.0.1:{}", port);
        let deadline = Duration::from_secs(2);

        // wait for the listener
        let mut ready = false;
        for _ in 0..50 {
            if client.send(&address, Message::CheckHealth, deadline).await.is_ok() {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ready);
        assert_eq!(node.lifecycle().await, Lifecycle::Running);

        let response = client
            .send(
                &address,
                Message::PutKey {
                    key: "a".into(),
                    value: "1".into(),
                    is_replica: false,
                },
                deadline,
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            Message::PutKeyReturn {
                code: 0,
                message: "Stored (primary): a. Replicated to 0/0 replicas.".into()
            }
        );

        let response = client
            .send(&address, Message::GetKey { key: "a".into() }, deadline)
            .await
            .unwrap();
        assert_eq!(
            response,
            Message::Value {
                value: Lookup::Found("1".into())
            }
        );

        node.shutdown();
        handle.await.unwrap().unwrap();
        assert_eq!(node.lifecycle().await, Lifecycle::Stopping);

        let on_disk = std::fs::read_to_string(node.store().path()).unwrap();
        assert_eq!(parse_snapshot(&on_disk).unwrap().get("a").map(String::as_str), Some("1"));
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_sees_prior_signal() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_millis(100), wait_for_shutdown(&mut rx))
            .await
            .unwrap();
    }
}
