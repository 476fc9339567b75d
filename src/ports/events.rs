//! Event Publisher Port - Saga Fan-out
//!
//! Stages publish their completion events through this trait rather
//! than reaching for a global bus, so each stage can be driven alone in
//! tests with a recording publisher.

use crate::domain::events::SagaEvent;

/// Fire-and-forget event publisher.
///
/// `publish` must return without waiting for any subscriber.
pub trait EventPublisher: Send + Sync + 'static {
  /// Hand `event` to every subscriber registered for its type.
  fn publish(&self, event: SagaEvent);
}
