//! Peer Status Table
//!
//! Liveness classification of every peer. The health monitor is the only
//! writer; the router and recovery read it.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cluster::{ClusterTable, NodeId};

/// Liveness of a peer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerStatus {
    /// No probe has completed yet
    Unknown,
    /// Last probe answered "serving"
    Alive,
    /// Last probe answered with another status
    Unhealthy,
    /// Last probe failed
    Dead,
}

impl PeerStatus {
    /// Whether requests for this peer may be forwarded to it
    pub fn may_forward(&self) -> bool {
        matches!(self, PeerStatus::Alive | PeerStatus::Unknown)
    }
}

impl std::fmt::Display for PeerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerStatus::Unknown => write!(f, "UNKNOWN"),
            PeerStatus::Alive => write!(f, "ALIVE"),
            PeerStatus::Unhealthy => write!(f, "UNHEALTHY"),
            PeerStatus::Dead => write!(f, "DEAD"),
        }
    }
}

/// State of a single peer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerState {
    /// Peer node ID
    pub id: NodeId,
    /// Peer address (host:port)
    pub address: String,
    /// Current classification
    pub status: PeerStatus,
    /// When the classification last changed
    pub changed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl PeerState {
    fn new(id: NodeId, address: String) -> Self {
        Self {
            id,
            address,
            status: PeerStatus::Unknown,
            changed_at: None,
        }
    }
}

/// A status change recorded by [`PeerTable::record`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: PeerStatus,
    pub to: PeerStatus,
}

/// Peer status table
pub struct PeerTable {
    /// This node's ID
    node_id: NodeId,
    /// Every peer except self
    peers: RwLock<BTreeMap<NodeId, PeerState>>,
}

impl PeerTable {
    /// Create the table with every peer UNKNOWN
    pub fn new(node_id: &str, cluster: &ClusterTable) -> Self {
        let peers = cluster
            .peers_of(node_id)
            .map(|(id, addr)| (id.to_string(), PeerState::new(id.to_string(), addr.to_string())))
            .collect();

        Self {
            node_id: node_id.to_string(),
            peers: RwLock::new(peers),
        }
    }

    /// Get this node's ID
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Current status of a peer (UNKNOWN if not in the table)
    pub async fn status_of(&self, id: &str) -> PeerStatus {
        self.peers
            .read()
            .await
            .get(id)
            .map(|p| p.status)
            .unwrap_or(PeerStatus::Unknown)
    }

    /// Record a probe result; returns the transition if the status changed
    pub async fn record(&self, id: &str, status: PeerStatus) -> Option<Transition> {
        let mut peers = self.peers.write().await;
        let peer = peers.get_mut(id)?;

        if peer.status == status {
            return None;
        }

        let transition = Transition {
            from: peer.status,
            to: status,
        };
        peer.status = status;
        peer.changed_at = Some(chrono::Utc::now());
        Some(transition)
    }

    /// Copy of every peer's state, in canonical order
    pub async fn snapshot(&self) -> Vec<PeerState> {
        self.peers.read().await.values().cloned().collect()
    }

    /// Number of peers
    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Check if there are no peers (single-node cluster)
    pub async fn is_empty(&self) -> bool {
        self.peers.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn cluster() -> ClusterTable {
        ClusterTable::new(BTreeMap::from([
            ("node1".to_string(), "localhost:50051".to_string()),
            ("node2".to_string(), "localhost:50052".to_string()),
            ("node3".to_string(), "localhost:50053".to_string()),
        ]))
        .unwrap()
    }

    #[tokio::test]
    async fn test_starts_unknown_and_excludes_self() {
        let table = PeerTable::new("node1", &cluster());
        assert_eq!(table.len().await, 2);
        assert_eq!(table.status_of("node2").await, PeerStatus::Unknown);
        assert_eq!(table.status_of("node3").await, PeerStatus::Unknown);

        let ids: Vec<_> = table.snapshot().await.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["node2", "node3"]);
    }

    #[tokio::test]
    async fn test_record_reports_only_changes() {
        let table = PeerTable::new("node1", &cluster());

        assert_eq!(
            table.record("node2", PeerStatus::Alive).await,
            Some(Transition {
                from: PeerStatus::Unknown,
                to: PeerStatus::Alive
            })
        );
        assert_eq!(table.record("node2", PeerStatus::Alive).await, None);
        assert_eq!(
            table.record("node2", PeerStatus::Dead).await,
            Some(Transition {
                from: PeerStatus::Alive,
                to: PeerStatus::Dead
            })
        );

        // self and unknown ids are never tracked
        assert_eq!(table.record("node1", PeerStatus::Alive).await, None);
        assert_eq!(table.record("node9", PeerStatus::Alive).await, None);
    }

    #[test]
    fn test_may_forward() {
        assert!(PeerStatus::Alive.may_forward());
        assert!(PeerStatus::Unknown.may_forward());
        assert!(!PeerStatus::Dead.may_forward());
        assert!(!PeerStatus::Unhealthy.may_forward());
        assert_eq!(PeerStatus::Unhealthy.to_string(), "UNHEALTHY");
    }
}
