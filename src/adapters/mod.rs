//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure (HTTP collaborators, file I/O, Prometheus) and hosts
//! the inbound HTTP server.
//!
//! Adapter categories:
//! - `api`: REST clients for the provisioning collaborators
//! - `http`: axum server for registration, probes and metrics
//! - `metrics`: Prometheus `MetricsSink`
//! - `persistence`: JSON-file and in-memory user repositories

pub mod api;
pub mod http;
pub mod metrics;
pub mod persistence;
