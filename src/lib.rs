//! KvMesh - Partitioned, Replicated Key-Value Store
//!
//! Each node of a fixed cluster owns the keys the partitioner assigns to it,
//! serves them from a locally persisted map, and copies its writes to the
//! peers it currently believes alive.
//!
//! # Architecture
//!
//! - A deterministic hash partitioner maps every key to one primary node.
//! - Requests arriving at a non-primary are forwarded to the primary, unless
//!   the health monitor has marked it down, in which case they fail fast.
//! - The primary commits a write on local persist, then replicates it on a
//!   best-effort basis.
//! - A restarted node pulls a full snapshot from a random live peer.

pub mod config;
pub mod error;
pub mod cluster;
pub mod state;
pub mod replication;
pub mod network;
pub mod api;
pub mod node;

pub use config::KvMeshConfig;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::KvMeshConfig;
    pub use crate::error::{Error, Result};
    pub use crate::cluster::{primary_of, ClusterTable, NodeId};
    pub use crate::state::{LocalStore, PeerStatus, PeerTable};
    pub use crate::replication::{Lookup, Message, Router};
    pub use crate::network::{NetworkClient, Transport};
    pub use crate::node::KvNode;
}
