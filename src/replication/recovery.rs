//! Recovery Manager
//!
//! One-shot catch-up at startup: after a short delay, pull a full snapshot
//! from a randomly ordered peer and replace the local store with it.

use std::sync::Arc;
use std::time::Duration;
use rand::seq::SliceRandom;

use super::protocol::Message;
use crate::cluster::{ClusterTable, NodeId};
use crate::error::{Error, Result};
use crate::network::Transport;
use crate::state::{parse_snapshot, LocalStore, PeerStatus, PeerTable};

/// Result of a recovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Store replaced with a peer's snapshot
    Recovered { source: NodeId, keys: usize },
    /// Single-node cluster, nothing to recover from
    NoPeers,
    /// Every candidate was skipped or failed; local data kept
    Exhausted,
}

/// Startup recovery manager
pub struct RecoveryManager {
    node_id: NodeId,
    cluster: Arc<ClusterTable>,
    store: Arc<LocalStore>,
    peers: Arc<PeerTable>,
    transport: Arc<dyn Transport>,
    delay: Duration,
    snapshot_timeout: Duration,
}

impl RecoveryManager {
    pub fn new(
        node_id: NodeId,
        cluster: Arc<ClusterTable>,
        store: Arc<LocalStore>,
        peers: Arc<PeerTable>,
        transport: Arc<dyn Transport>,
        delay: Duration,
        snapshot_timeout: Duration,
    ) -> Self {
        Self {
            node_id,
            cluster,
            store,
            peers,
            transport,
            delay,
            snapshot_timeout,
        }
    }

    /// Wait for the startup delay, then attempt recovery once
    pub async fn run(&self) -> RecoveryOutcome {
        tokio::time::sleep(self.delay).await;
        self.attempt().await
    }

    /// Try candidates in random order until one snapshot is applied
    pub async fn attempt(&self) -> RecoveryOutcome {
        let mut candidates: Vec<(&str, &str)> = self.cluster.peers_of(&self.node_id).collect();
        if candidates.is_empty() {
            tracing::info!("No peers to recover from");
            return RecoveryOutcome::NoPeers;
        }
        candidates.shuffle(&mut rand::thread_rng());

        tracing::info!(
            "Starting recovery for node {} ({} candidates)",
            self.node_id,
            candidates.len()
        );

        for (id, address) in candidates {
            let status = self.peers.status_of(id).await;
            if status == PeerStatus::Dead {
                tracing::debug!("Skipping recovery source {} (DEAD)", id);
                continue;
            }

            match self.recover_from(address).await {
                Ok(keys) => {
                    tracing::info!("Recovered {} keys from {}", keys, id);
                    return RecoveryOutcome::Recovered {
                        source: id.to_string(),
                        keys,
                    };
                }
                Err(e) => {
                    tracing::warn!("Recovery from {} failed: {}", id, e);
                }
            }
        }

        tracing::warn!("Recovery exhausted all peers, keeping local data");
        RecoveryOutcome::Exhausted
    }

    /// Fetch, validate and apply one peer's snapshot
    async fn recover_from(&self, address: &str) -> Result<usize> {
        let response = self
            .transport
            .call(address, Message::RequestFullSnapshot, self.snapshot_timeout)
            .await?;

        let data_json = match response {
            Message::FullSnapshot { data_json } => data_json,
            other => {
                return Err(Error::UnexpectedResponse {
                    expected: "FullSnapshot",
                    got: other.type_name(),
                })
            }
        };

        if data_json.is_empty() {
            return Err(Error::Internal("peer returned an empty snapshot".into()));
        }

        let snapshot = parse_snapshot(&data_json)?;
        let keys = snapshot.len();
        self.store.replace(snapshot).await?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::loopback::LoopbackTransport;
    use crate::state::Snapshot;
    use std::collections::BTreeMap;

    struct Fixture {
        _dir: tempfile::TempDir,
        transport: Arc<LoopbackTransport>,
        store: Arc<LocalStore>,
        peers: Arc<PeerTable>,
        manager: RecoveryManager,
    }

    fn fixture(ids: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let cluster = Arc::new(
            ClusterTable::new(
                ids.iter()
                    .map(|id| (id.to_string(), format!("{}-addr", id)))
                    .collect::<BTreeMap<_, _>>(),
            )
            .unwrap(),
        );
        let store = Arc::new(
            LocalStore::open(LocalStore::snapshot_path(dir.path(), "node1")).unwrap(),
        );
        let peers = Arc::new(PeerTable::new("node1", &cluster));
        let transport = LoopbackTransport::new();
        let manager = RecoveryManager::new(
            "node1".into(),
            cluster,
            Arc::clone(&store),
            Arc::clone(&peers),
            transport.clone(),
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        Fixture {
            _dir: dir,
            transport,
            store,
            peers,
            manager,
        }
    }

    fn snapshot_reply(data: &'static str) -> impl Fn(Message) -> crate::Result<Message> {
        move |_| {
            Ok(Message::FullSnapshot {
                data_json: data.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_recovers_peer_snapshot() {
        let f = fixture(&["node1", "node2"]);
        f.store.put("stale", "x").await.unwrap();
        f.transport
            .script("node2-addr", snapshot_reply(r#"{"a":"1","b":"2"}"#));

        let outcome = f.manager.run().await;
        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                source: "node2".into(),
                keys: 2
            }
        );

        let expected = Snapshot::from([
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
        ]);
        assert_eq!(f.store.snapshot().await, expected);
        let on_disk = std::fs::read_to_string(f.store.path()).unwrap();
        assert_eq!(parse_snapshot(&on_disk).unwrap(), expected);
    }

    #[tokio::test]
    async fn test_single_node_has_no_peers() {
        let f = fixture(&["node1"]);
        assert_eq!(f.manager.attempt().await, RecoveryOutcome::NoPeers);
        assert!(f.transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_dead_peers_are_skipped() {
        let f = fixture(&["node1", "node2", "node3"]);
        f.peers.record("node2", PeerStatus::Dead).await;
        f.transport.script("node2-addr", snapshot_reply(r#"{"wrong":"1"}"#));
        f.transport.script("node3-addr", snapshot_reply(r#"{"right":"1"}"#));

        let outcome = f.manager.attempt().await;
        assert_eq!(
            outcome,
            RecoveryOutcome::Recovered {
                source: "node3".into(),
                keys: 1
            }
        );
        assert!(f.transport.calls_to("node2-addr").is_empty());
    }

    #[tokio::test]
    async fn test_bad_candidates_fall_through() {
        let f = fixture(&["node1", "node2", "node3", "node4"]);
        f.transport.script("node2-addr", snapshot_reply(""));
        f.transport.script("node3-addr", snapshot_reply("{broken"));
        f.transport.set_down("node4-addr", true);
        f.store.put("local", "kept").await.unwrap();

        assert_eq!(f.manager.attempt().await, RecoveryOutcome::Exhausted);
        assert_eq!(f.store.get("local").await.as_deref(), Some("kept"));
        assert_eq!(f.transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_object_counts_as_recovery() {
        let f = fixture(&["node1", "node2"]);
        f.store.put("local", "gone").await.unwrap();
        f.transport.script("node2-addr", snapshot_reply("{}"));

        assert_eq!(
            f.manager.attempt().await,
            RecoveryOutcome::Recovered {
                source: "node2".into(),
                keys: 0
            }
        );
        assert!(f.store.is_empty().await);
    }
}
