//! Prometheus Metrics Registry - Saga Observability
//!
//! Implements the `MetricsSink` port. Covers stage outcomes and
//! latency, worker-pool occupancy and event fan-out. Exposed as text
//! by the HTTP server's `/metrics` route.

use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::ports::metrics::MetricsSink;

/// Centralized Prometheus metrics for the onboarding saga.
///
/// All metrics follow the naming convention `onboarding_*`.
pub struct SagaMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Stage task outcomes by stage and outcome (`ok` or error kind).
    pub stage_total: IntCounterVec,
    /// Stage task duration (seconds).
    pub stage_duration: HistogramVec,
    /// Stage tasks currently held by the worker pool.
    pub tasks_in_flight: IntGauge,
    /// Events published, by topic.
    pub events_published: IntCounterVec,
    /// Handler deliveries, by topic.
    pub event_deliveries: IntCounterVec,
}

impl SagaMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let stage_total = IntCounterVec::new(
            Opts::new("onboarding_stage_total", "Stage task outcomes"),
            &["stage", "outcome"],
        )?;

        let stage_duration = HistogramVec::new(
            HistogramOpts::new(
                "onboarding_stage_duration_seconds",
                "Stage task duration in seconds",
            )
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["stage"],
        )?;

        let tasks_in_flight = IntGauge::new(
            "onboarding_tasks_in_flight",
            "Stage tasks queued or running on the worker pool",
        )?;

        let events_published = IntCounterVec::new(
            Opts::new("onboarding_events_published_total", "Saga events published"),
            &["topic"],
        )?;

        let event_deliveries = IntCounterVec::new(
            Opts::new(
                "onboarding_event_deliveries_total",
                "Saga events handed to subscribers",
            ),
            &["topic"],
        )?;

        registry.register(Box::new(stage_total.clone()))?;
        registry.register(Box::new(stage_duration.clone()))?;
        registry.register(Box::new(tasks_in_flight.clone()))?;
        registry.register(Box::new(events_published.clone()))?;
        registry.register(Box::new(event_deliveries.clone()))?;

        Ok(Self {
            registry,
            stage_total,
            stage_duration,
            tasks_in_flight,
            events_published,
            event_deliveries,
        })
    }

    /// Render every registered metric in the text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl MetricsSink for SagaMetrics {
    fn stage_finished(&self, stage: &str, outcome: &str, elapsed: Duration) {
        self.stage_total.with_label_values(&[stage, outcome]).inc();
        self.stage_duration
            .with_label_values(&[stage])
            .observe(elapsed.as_secs_f64());
    }

    fn task_started(&self) {
        self.tasks_in_flight.inc();
    }

    fn task_finished(&self) {
        self.tasks_in_flight.dec();
    }

    fn event_published(&self, topic: &str, subscribers: usize) {
        self.events_published.with_label_values(&[topic]).inc();
        self.event_deliveries
            .with_label_values(&[topic])
            .inc_by(subscribers as u64);
    }
}
