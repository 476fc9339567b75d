//! Worker Pool - Bounded Execution of Stage Tasks
//!
//! Every saga stage runs here, never on the publisher's task. A
//! semaphore bounds how many stage tasks make external calls at once;
//! an in-flight counter lets shutdown wait for the pool to drain.
//!
//! A failing task is logged and measured, and nothing else happens:
//! errors never reach the code that spawned the task.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::ports::metrics::MetricsSink;

/// Decrements the in-flight counter even if the task panics.
struct InFlightGuard {
  in_flight: Arc<AtomicUsize>,
  idle: Arc<Notify>,
  metrics: Arc<dyn MetricsSink>,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
      self.idle.notify_waiters();
    }
    self.metrics.task_finished();
  }
}

/// Bounded pool for saga stage tasks.
pub struct WorkerPool {
  semaphore: Arc<Semaphore>,
  in_flight: Arc<AtomicUsize>,
  idle: Arc<Notify>,
  closed: AtomicBool,
  metrics: Arc<dyn MetricsSink>,
}

impl WorkerPool {
  /// Create a pool running at most `max_concurrent` tasks at once.
  pub fn new(max_concurrent: usize, metrics: Arc<dyn MetricsSink>) -> Self {
    Self {
      semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
      in_flight: Arc::new(AtomicUsize::new(0)),
      idle: Arc::new(Notify::new()),
      closed: AtomicBool::new(false),
      metrics,
    }
  }

  /// Run `task` in the background on behalf of `user_id`.
  ///
  /// Returns immediately. Returns `false` (and drops the task) once the
  /// pool has been closed for shutdown.
  pub fn spawn<F>(&self, stage: &'static str, user_id: Uuid, task: F) -> bool
  where
    F: Future<Output = Result<(), SagaError>> + Send + 'static,
  {
    if self.closed.load(Ordering::SeqCst) {
      warn!(stage, user_id = %user_id, "Worker pool closed, dropping stage task");
      return false;
    }

    self.in_flight.fetch_add(1, Ordering::SeqCst);
    self.metrics.task_started();

    let guard = InFlightGuard {
      in_flight: Arc::clone(&self.in_flight),
      idle: Arc::clone(&self.idle),
      metrics: Arc::clone(&self.metrics),
    };
    let semaphore = Arc::clone(&self.semaphore);
    let metrics = Arc::clone(&self.metrics);

    tokio::spawn(async move {
      let _guard = guard;
      // The semaphore is never closed, so a permit always arrives.
      let _permit = semaphore.acquire_owned().await.ok();

      let started = Instant::now();
      let result = task.await;
      let elapsed = started.elapsed();

      match result {
        Ok(()) => {
          metrics.stage_finished(stage, "ok", elapsed);
          debug!(
            stage,
            user_id = %user_id,
            elapsed_ms = elapsed.as_millis(),
            "Stage task finished"
          );
        }
        Err(e) => {
          metrics.stage_finished(stage, e.kind(), elapsed);
          error!(
            stage,
            user_id = %user_id,
            error = %e,
            kind = e.kind(),
            elapsed_ms = elapsed.as_millis(),
            "Stage task failed, saga stalled for user"
          );
        }
      }
    });

    true
  }

  /// Number of tasks spawned and not yet finished.
  pub fn in_flight(&self) -> usize {
    self.in_flight.load(Ordering::SeqCst)
  }

  /// Refuse new tasks. Tasks already spawned keep running.
  pub fn close(&self) {
    self.closed.store(true, Ordering::SeqCst);
  }

  /// Whether `close` has been called.
  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  /// Wait until no task is in flight.
  ///
  /// Tasks spawned by running tasks count too, so this waits for a
  /// whole saga chain, not just its first stage.
  pub async fn wait_idle(&self) {
    loop {
      let notified = self.idle.notified();
      if self.in_flight() == 0 {
        return;
      }
      notified.await;
    }
  }

  /// Close the pool and wait up to `timeout` for it to drain.
  ///
  /// Returns `true` if it drained in time.
  pub async fn drain(&self, timeout: Duration) -> bool {
    self.close();
    tokio::time::timeout(timeout, self.wait_idle()).await.is_ok()
  }
}
