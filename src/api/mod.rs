//! HTTP API Module
//!
//! Provides an optional read-only status API.

mod http;

pub use http::{AppState, HealthResponse, HttpServer, StatusResponse};
