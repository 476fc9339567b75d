//! Inbound HTTP Adapter
//!
//! axum server exposing registration, probes and metrics.

pub mod server;

pub use server::ApiServer;
