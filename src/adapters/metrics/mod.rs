//! Metrics Adapter
//!
//! Prometheus implementation of the `MetricsSink` port. The registry
//! is rendered by the HTTP server's `/metrics` route.

pub mod prometheus;

pub use prometheus::SagaMetrics;
