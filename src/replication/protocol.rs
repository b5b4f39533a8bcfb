//! Replication Protocol
//!
//! Defines the wire protocol for communication between nodes and clients.

use serde::{Deserialize, Serialize};

/// Sentinel string clients use for a missing key
pub const NOT_FOUND: &str = "<KEY_NOT_FOUND>";

/// Health status reported by a node that is serving requests
pub const SERVING: &str = "SERVING";

/// Result of a key lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookup {
    Found(String),
    NotFound,
}

impl Lookup {
    /// String form used by clients, with `NOT_FOUND` for a missing key
    pub fn as_wire_str(&self) -> &str {
        match self {
            Lookup::Found(value) => value,
            Lookup::NotFound => NOT_FOUND,
        }
    }

    /// Convert into an `Option`
    pub fn into_option(self) -> Option<String> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound => None,
        }
    }
}

impl From<Option<String>> for Lookup {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(v) => Lookup::Found(v),
            None => Lookup::NotFound,
        }
    }
}

/// Protocol messages for node communication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    // ========== Key Operations ==========
    /// Read a key
    GetKey { key: String },

    /// Lookup result
    Value { value: Lookup },

    /// Write a key; `is_replica` is only set on primary -> replica calls
    PutKey {
        key: String,
        value: String,
        is_replica: bool,
    },

    /// Write acknowledgement
    PutKeyReturn { code: i32, message: String },

    /// Delete a key; `is_replica` is only set on primary -> replica calls
    DeleteKey { key: String, is_replica: bool },

    /// Delete acknowledgement
    DeleteKeyReturn { message: String },

    // ========== Recovery ==========
    /// Ask a peer for its whole store
    RequestFullSnapshot,

    /// Serialized store contents (JSON object)
    FullSnapshot { data_json: String },

    // ========== Health ==========
    /// Liveness probe
    CheckHealth,

    /// Liveness status
    Health { status: String },

    // ========== Error ==========
    /// Error response
    Error { code: ErrorCode, message: String },
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Primary unreachable or known down
    Unavailable,
    /// Outbound call ran past its deadline
    DeadlineExceeded,
    /// Malformed or unexpected request
    InvalidRequest,
    /// Internal error
    Internal,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::Unavailable => write!(f, "UNAVAILABLE"),
            ErrorCode::DeadlineExceeded => write!(f, "DEADLINE_EXCEEDED"),
            ErrorCode::InvalidRequest => write!(f, "INVALID_REQUEST"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl Message {
    /// Serialize message to bytes
    pub fn serialize(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize message from bytes
    pub fn deserialize(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }

    /// Build an error response from a crate error
    pub fn from_error(err: &crate::Error) -> Self {
        Message::Error {
            code: err.code(),
            message: err.to_string(),
        }
    }

    /// Whether this message is a request a node should serve
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Message::GetKey { .. }
                | Message::PutKey { .. }
                | Message::DeleteKey { .. }
                | Message::RequestFullSnapshot
                | Message::CheckHealth
        )
    }

    /// Get the message type name (for logging)
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::GetKey { .. } => "GetKey",
            Message::Value { .. } => "Value",
            Message::PutKey { .. } => "PutKey",
            Message::PutKeyReturn { .. } => "PutKeyReturn",
            Message::DeleteKey { .. } => "DeleteKey",
            Message::DeleteKeyReturn { .. } => "DeleteKeyReturn",
            Message::RequestFullSnapshot => "RequestFullSnapshot",
            Message::FullSnapshot { .. } => "FullSnapshot",
            Message::CheckHealth => "CheckHealth",
            Message::Health { .. } => "Health",
            Message::Error { .. } => "Error",
        }
    }
}

/// Frame header for length-prefixed messages
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    /// Message length
    pub length: u32,
    /// Message checksum
    pub checksum: u32,
}

impl FrameHeader {
    /// Header size in bytes
    pub const SIZE: usize = 8;

    /// Create a new frame header
    pub fn new(data: &[u8]) -> Self {
        Self {
            length: data.len() as u32,
            checksum: crc32fast::hash(data),
        }
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0..4].copy_from_slice(&self.length.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.checksum.to_le_bytes());
        bytes
    }

    /// Deserialize header from bytes
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let [l0, l1, l2, l3, c0, c1, c2, c3] = *bytes;
        Self {
            length: u32::from_le_bytes([l0, l1, l2, l3]),
            checksum: u32::from_le_bytes([c0, c1, c2, c3]),
        }
    }
}
