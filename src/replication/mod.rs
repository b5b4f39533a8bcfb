//! Replication Module
//!
//! Request routing to key primaries, best-effort replica fan-out and
//! startup recovery from peer snapshots.

pub mod protocol;
mod recovery;
mod router;

pub use protocol::{ErrorCode, FrameHeader, Lookup, Message, NOT_FOUND, SERVING};
pub use recovery::{RecoveryManager, RecoveryOutcome};
pub use router::{PutAck, ReplicationReport, Router, RouterConfig};
