//! State Module
//!
//! Node-local state: the persisted store and peer liveness tracking.

mod membership;
mod monitor;
mod store;

pub use membership::{PeerState, PeerStatus, PeerTable, Transition};
pub use monitor::{HealthMonitor, MonitorConfig};
pub use store::{encode_snapshot, parse_snapshot, LocalStore, Snapshot};
