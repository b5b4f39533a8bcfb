//! KvMesh Error Types

use thiserror::Error;

use crate::replication::ErrorCode;

/// Result type alias for KvMesh operations
pub type Result<T> = std::result::Result<T, Error>;

/// KvMesh error types
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Routing errors
    #[error("Primary node {node_id} ({address}) is not available: {status}")]
    Unavailable {
        node_id: String,
        address: String,
        status: String,
    },

    /// Failure reported by a peer, relayed as-is
    #[error("{message}")]
    Remote { code: ErrorCode, message: String },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Connection timeout to {0}")]
    ConnectionTimeout(String),

    #[error("Unexpected response: expected {expected}, got {got}")]
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },

    // Serialization errors
    #[error("Message serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Shutdown in progress")]
    ShuttingDown,
}

impl Error {
    /// Check if this error came from failing to reach a peer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Network(_)
                | Error::ConnectionFailed { .. }
                | Error::ConnectionTimeout(_)
                | Error::UnexpectedResponse { .. }
        )
    }

    /// Wire error code used when this error is returned to a caller
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Remote { code, .. } => *code,
            Error::Unavailable { .. }
            | Error::Network(_)
            | Error::ConnectionFailed { .. }
            | Error::ShuttingDown => ErrorCode::Unavailable,
            Error::ConnectionTimeout(_) => ErrorCode::DeadlineExceeded,
            Error::UnexpectedResponse { .. } => ErrorCode::InvalidRequest,
            Error::Config(_)
            | Error::ConfigParse(_)
            | Error::Serialization(_)
            | Error::Snapshot(_)
            | Error::Io(_)
            | Error::Internal(_) => ErrorCode::Internal,
        }
    }
}
