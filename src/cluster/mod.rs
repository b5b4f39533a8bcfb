//! Cluster Module
//!
//! Fixed cluster membership and key partitioning.

mod partition;
mod table;

pub use partition::{key_hash, primary_of};
pub use table::{ClusterTable, NodeId};
