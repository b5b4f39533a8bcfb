//! KvMesh Configuration
//!
//! This module provides configuration structures for a KvMesh node.
//! Every field has a default, so a node can start without any file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main KvMesh configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct KvMeshConfig {
    /// Node-local settings
    #[serde(default)]
    pub node: NodeConfig,

    /// Fixed cluster membership
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Peer health monitor settings
    #[serde(default)]
    pub health: HealthConfig,

    /// Startup recovery settings
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Outbound RPC settings
    #[serde(default)]
    pub rpc: RpcConfig,

    /// HTTP status API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-local configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Host to bind the RPC listener on (port comes from the command line)
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Directory holding the persisted snapshot file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum number of requests served concurrently
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

/// Cluster configuration
///
/// Must be identical on every node and every client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Node ID -> address (host:port)
    #[serde(default = "default_nodes")]
    pub nodes: BTreeMap<String, String>,
}

/// Health monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Interval between probe rounds in milliseconds
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Per-probe timeout in milliseconds (must be shorter than the interval)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Delay before the first probe round in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

/// Recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Pull a snapshot from a peer at startup
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Delay after process start before recovery runs, in milliseconds
    #[serde(default = "default_recovery_delay_ms")]
    pub delay_ms: u64,

    /// Timeout for a single snapshot request in milliseconds
    #[serde(default = "default_snapshot_timeout_ms")]
    pub snapshot_timeout_ms: u64,
}

/// Outbound RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Deadline for requests forwarded to a key's primary, in milliseconds
    #[serde(default = "default_forward_timeout_ms")]
    pub forward_timeout_ms: u64,

    /// Deadline for each replica write, in milliseconds
    #[serde(default = "default_replica_timeout_ms")]
    pub replica_timeout_ms: u64,

    /// Maximum replica writes in flight per client write
    #[serde(default = "default_replica_fanout")]
    pub replica_fanout: usize,
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Enable the HTTP status API
    #[serde(default)]
    pub enabled: bool,

    /// HTTP port = RPC port + offset
    #[serde(default = "default_api_port_offset")]
    pub port_offset: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_in_flight() -> usize {
    10
}

fn default_nodes() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("node1".to_string(), "localhost:50051".to_string()),
        ("node2".to_string(), "localhost:50052".to_string()),
        ("node3".to_string(), "localhost:50053".to_string()),
    ])
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_probe_timeout_ms() -> u64 {
    2000
}

fn default_initial_delay_ms() -> u64 {
    1500
}

fn default_true() -> bool {
    true
}

fn default_recovery_delay_ms() -> u64 {
    3000
}

fn default_snapshot_timeout_ms() -> u64 {
    15000
}

fn default_forward_timeout_ms() -> u64 {
    5000
}

fn default_replica_timeout_ms() -> u64 {
    5000
}

fn default_replica_fanout() -> usize {
    4
}

fn default_api_port_offset() -> u16 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            data_dir: default_data_dir(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_ms: default_recovery_delay_ms(),
            snapshot_timeout_ms: default_snapshot_timeout_ms(),
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            forward_timeout_ms: default_forward_timeout_ms(),
            replica_timeout_ms: default_replica_timeout_ms(),
            replica_fanout: default_replica_fanout(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port_offset: default_api_port_offset(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl KvMeshConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: KvMeshConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.cluster.nodes.is_empty() {
            return Err(crate::Error::Config("cluster.nodes cannot be empty".into()));
        }

        for (id, address) in &self.cluster.nodes {
            if id.is_empty() {
                return Err(crate::Error::Config("cluster node id cannot be empty".into()));
            }
            if address.is_empty() {
                return Err(crate::Error::Config(format!(
                    "cluster node {} has an empty address",
                    id
                )));
            }
        }

        if self.health.probe_timeout_ms >= self.health.heartbeat_interval_ms {
            return Err(crate::Error::Config(
                "health.probe_timeout_ms must be shorter than health.heartbeat_interval_ms".into(),
            ));
        }

        if self.node.max_in_flight == 0 {
            return Err(crate::Error::Config("node.max_in_flight must be at least 1".into()));
        }

        if self.rpc.replica_fanout == 0 {
            return Err(crate::Error::Config("rpc.replica_fanout must be at least 1".into()));
        }

        Ok(())
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &PathBuf {
        &self.node.data_dir
    }

    /// Get heartbeat interval as Duration
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.health.heartbeat_interval_ms)
    }

    /// Get probe timeout as Duration
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.health.probe_timeout_ms)
    }

    /// Get the monitor's startup delay as Duration
    pub fn health_initial_delay(&self) -> Duration {
        Duration::from_millis(self.health.initial_delay_ms)
    }

    /// Get the recovery delay as Duration
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_millis(self.recovery.delay_ms)
    }

    /// Get the snapshot request timeout as Duration
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery.snapshot_timeout_ms)
    }

    /// Get the forwarding deadline as Duration
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.forward_timeout_ms)
    }

    /// Get the replica write deadline as Duration
    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc.replica_timeout_ms)
    }
}
