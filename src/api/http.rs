//! HTTP API Server
//!
//! Read-only status endpoints for operators.

use std::sync::Arc;
use axum::{
    extract::{Json, State},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, RwLock};
use tower_http::trace::TraceLayer;

use crate::error::{Error, Result};
use crate::node::{wait_for_shutdown, Lifecycle};
use crate::replication::SERVING;
use crate::state::{LocalStore, PeerState, PeerTable};

/// Shared application state
pub struct AppState {
    /// Node ID
    pub node_id: String,
    /// RPC address this node serves on
    pub address: String,
    /// Process lifecycle
    pub lifecycle: Arc<RwLock<Lifecycle>>,
    /// Local store
    pub store: Arc<LocalStore>,
    /// Peer status table
    pub peers: Arc<PeerTable>,
}

/// HTTP API server
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Create the router
    fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve until the shutdown flag flips to true
    pub async fn start(
        &self,
        bind_address: &str,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<()> {
        let app = Self::create_router(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(bind_address).await?;
        tracing::info!("HTTP API listening on {}", bind_address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { wait_for_shutdown(&mut shutdown_rx).await })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Response Types ============

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
}

/// Status response
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub node_id: String,
    pub address: String,
    pub lifecycle: Lifecycle,
    pub keys: usize,
    pub peers: Vec<PeerState>,
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: SERVING.to_string(),
        node_id: state.node_id.clone(),
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        node_id: state.node_id.clone(),
        address: state.address.clone(),
        lifecycle: *state.lifecycle.read().await,
        keys: state.store.len().await,
        peers: state.peers.snapshot().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterTable;
    use crate::state::PeerStatus;
    use std::collections::BTreeMap;

    fn app_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let cluster = ClusterTable::new(BTreeMap::from([
            ("node1".to_string(), "localhost:50051".to_string()),
            ("node2".to_string(), "localhost:50052".to_string()),
        ]))
        .unwrap();
        Arc::new(AppState {
            node_id: "node1".into(),
            address: "0.0.0.0:50051".into(),
            lifecycle: Arc::new(RwLock::new(Lifecycle::Running)),
            store: Arc::new(
                LocalStore::open(LocalStore::snapshot_path(dir.path(), "node1")).unwrap(),
            ),
            peers: Arc::new(PeerTable::new("node1", &cluster)),
        })
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let Json(health) = handle_health(State(app_state(&dir))).await;
        assert_eq!(health.status, "SERVING");
        assert_eq!(health.node_id, "node1");
    }

    #[tokio::test]
    async fn test_status_reports_keys_and_peers() {
        let dir = tempfile::tempdir().unwrap();
        let state = app_state(&dir);
        state.store.put("a", "1").await.unwrap();
        state.peers.record("node2", PeerStatus::Dead).await;

        let Json(status) = handle_status(State(Arc::clone(&state))).await;
        assert_eq!(status.lifecycle, Lifecycle::Running);
        assert_eq!(status.keys, 1);
        assert_eq!(status.peers.len(), 1);
        assert_eq!(status.peers[0].status, PeerStatus::Dead);

        let body = serde_json::to_value(&status).unwrap();
        assert_eq!(body["peers"][0]["status"], "Dead");
    }
}
