//! Peer Health Monitor
//!
//! Background loop probing every peer with `CheckHealth` once per interval
//! and classifying it ALIVE, UNHEALTHY or DEAD.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::membership::{PeerStatus, PeerTable};
use crate::cluster::ClusterTable;
use crate::network::Transport;
use crate::replication::{Message, SERVING};

/// Health monitor timing
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay before the first round
    pub initial_delay: Duration,
    /// Time between rounds
    pub interval: Duration,
    /// Deadline for each probe (shorter than the interval)
    pub probe_timeout: Duration,
}

/// Peer health monitor
pub struct HealthMonitor {
    cluster: Arc<ClusterTable>,
    peers: Arc<PeerTable>,
    transport: Arc<dyn Transport>,
    config: MonitorConfig,
}

impl HealthMonitor {
    /// Create a new monitor
    pub fn new(
        cluster: Arc<ClusterTable>,
        peers: Arc<PeerTable>,
        transport: Arc<dyn Transport>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            cluster,
            peers,
            transport,
            config,
        }
    }

    /// Run probe rounds until shutdown
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(
            "Health monitor started for node {} ({} peers)",
            self.peers.node_id(),
            self.peers.len().await
        );

        tokio::select! {
            _ = tokio::time::sleep(self.config.initial_delay) => {}
            _ = shutdown_rx.changed() => return,
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_round().await;
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Health monitor stopped");
    }

    /// Probe every peer once, concurrently, and record the results
    pub async fn probe_round(&self) {
        let node_id = self.peers.node_id();
        let probes = self
            .cluster
            .peers_of(node_id)
            .map(|(id, address)| async move { (id, self.probe(address).await) });

        for (id, status) in futures::future::join_all(probes).await {
            if let Some(transition) = self.peers.record(id, status).await {
                match transition.to {
                    PeerStatus::Alive => tracing::info!(
                        "Peer {} status changed {} -> {}",
                        id,
                        transition.from,
                        transition.to
                    ),
                    _ => tracing::warn!(
                        "Peer {} status changed {} -> {}",
                        id,
                        transition.from,
                        transition.to
                    ),
                }
            }
        }
    }

    /// Classify one peer
    async fn probe(&self, address: &str) -> PeerStatus {
        match self
            .transport
            .call(address, Message::CheckHealth, self.config.probe_timeout)
            .await
        {
            Ok(Message::Health { status }) if status == SERVING => PeerStatus::Alive,
            Ok(Message::Health { status }) => {
                tracing::debug!("Peer at {} reports status {}", address, status);
                PeerStatus::Unhealthy
            }
            Ok(other) => {
                tracing::debug!(
                    "Peer at {} answered CheckHealth with {}",
                    address,
                    other.type_name()
                );
                PeerStatus::Unhealthy
            }
            Err(e) => {
                tracing::trace!("Probe of {} failed: {}", address, e);
                PeerStatus::Dead
            }
        }
    }
}
