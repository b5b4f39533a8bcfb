//! KvMesh - Partitioned, Replicated Key-Value Node
//!
//! Runs one storage node of a fixed cluster. The positional port selects
//! which configured node this process is.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kvmesh::cluster::ClusterTable;
use kvmesh::config::KvMeshConfig;
use kvmesh::error::Result;
use kvmesh::node::KvNode;

/// KvMesh - Partitioned, Replicated Key-Value Node
#[derive(Parser)]
#[command(name = "kvmesh")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// RPC port of this node; must match a configured cluster address
    port: u16,

    /// Path to configuration file (built-in three-node cluster if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Directory for the snapshot file
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => KvMeshConfig::from_file(path),
        None => Ok(KvMeshConfig::default()),
    };

    // Initialize logging
    let level = cli
        .log_level
        .clone()
        .or_else(|| loaded.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    let mut config = match loaded {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", cli.config, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    if let Some(data_dir) = cli.data_dir {
        config.node.data_dir = data_dir;
    }
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e);
    }

    run_node(config, cli.port).await
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the node configured on `port`
async fn run_node(config: KvMeshConfig, port: u16) -> Result<()> {
    let cluster = ClusterTable::from_config(&config.cluster)?;
    let node_id = match cluster.node_for_port(port) {
        Ok(id) => id.to_string(),
        Err(e) => {
            tracing::error!("No node configured on port {}: {}", port, e);
            tracing::error!("Configured nodes: {:?}", cluster.sorted_ids());
            return Err(e);
        }
    };
    tracing::info!("Starting KvMesh node {} ({} nodes in cluster)", node_id, cluster.len());

    if let Err(e) = std::fs::create_dir_all(config.data_dir()) {
        tracing::error!("Failed to create data directory {:?}: {}", config.data_dir(), e);
        return Err(e.into());
    }

    let node = KvNode::new(config, &node_id)?;
    node.run().await
}
