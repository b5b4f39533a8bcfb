//! Cluster Table
//!
//! Immutable NodeId -> address mapping shared by every node and client.

use std::collections::BTreeMap;

use super::partition::primary_of;
use crate::config::ClusterConfig;
use crate::error::{Error, Result};

/// Node identifier from the cluster table
pub type NodeId = String;

/// Fixed cluster membership
#[derive(Debug, Clone)]
pub struct ClusterTable {
    /// Node ID -> address
    nodes: BTreeMap<NodeId, String>,
    /// Node IDs in canonical (lexicographic) order
    sorted_ids: Vec<NodeId>,
}

impl ClusterTable {
    /// Build the table from configuration
    pub fn new(nodes: BTreeMap<NodeId, String>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::Config("cluster table is empty".into()));
        }

        let sorted_ids = nodes.keys().cloned().collect();
        Ok(Self { nodes, sorted_ids })
    }

    /// Build the table from the `[cluster]` section
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(config.nodes.clone())
    }

    /// Node IDs in canonical order
    pub fn sorted_ids(&self) -> &[NodeId] {
        &self.sorted_ids
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.sorted_ids.len()
    }

    /// Always false for a constructed table
    pub fn is_empty(&self) -> bool {
        self.sorted_ids.is_empty()
    }

    /// Address of a node
    pub fn address_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(String::as_str)
    }

    /// Primary node for a key
    pub fn primary_of(&self, key: &str) -> Result<&str> {
        primary_of(key, &self.sorted_ids)
    }

    /// All nodes except `self_id`, in canonical order, with their addresses
    pub fn peers_of<'a>(
        &'a self,
        self_id: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        self.sorted_ids
            .iter()
            .filter(move |id| id.as_str() != self_id)
            .filter_map(move |id| self.address_of(id).map(|addr| (id.as_str(), addr)))
    }

    /// Resolve the node whose address uses `port`
    pub fn node_for_port(&self, port: u16) -> Result<&str> {
        let suffix = format!(":{}", port);
        self.sorted_ids
            .iter()
            .find(|id| {
                self.address_of(id)
                    .map(|addr| addr.ends_with(&suffix))
                    .unwrap_or(false)
            })
            .map(String::as_str)
            .ok_or_else(|| {
                Error::Config(format!(
                    "port {} is not mapped to any node in the cluster table",
                    port
                ))
            })
    }

    /// Port component of a node's address
    pub fn port_of(&self, id: &str) -> Option<u16> {
        self.address_of(id)
            .and_then(|addr| addr.rsplit_once(':'))
            .and_then(|(_, port)| port.parse().ok())
    }
}
