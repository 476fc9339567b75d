//! Metrics Port - Saga Observability Hooks

use std::time::Duration;

/// Receiver of saga measurements.
pub trait MetricsSink: Send + Sync + 'static {
  /// A stage task finished with `outcome` (`ok` or an error kind).
  fn stage_finished(&self, stage: &str, outcome: &str, elapsed: Duration);

  /// A stage task was handed to the worker pool.
  fn task_started(&self);

  /// A stage task left the worker pool.
  fn task_finished(&self);

  /// An event was handed to `subscribers` handlers.
  fn event_published(&self, topic: &str, subscribers: usize);
}

/// Sink that drops every measurement.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
  fn stage_finished(&self, _stage: &str, _outcome: &str, _elapsed: Duration) {}

  fn task_started(&self) {}

  fn task_finished(&self) {}

  fn event_published(&self, _topic: &str, _subscribers: usize) {}
}
