//! Event Bus - Typed In-Process Fan-out
//!
//! One topic per event variant. Subscribers are registered at startup
//! with `subscribe::<E>`; `publish` looks up the topic for the event's
//! variant and spawns one worker-pool task per subscriber.
//!
//! Delivery is at-most-once to subscribers registered at publish time:
//! no persistence, no redelivery, no dead letters.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::domain::error::SagaError;
use crate::domain::events::{
  AssetsGenerationTriggered, DepositAddressProvisioned, LedgerProvisioned, SagaEvent,
  WalletProvisioned,
};
use crate::ports::events::EventPublisher;
use crate::ports::metrics::MetricsSink;

use super::worker_pool::WorkerPool;

/// A subscriber to one event type.
#[async_trait]
pub trait EventHandler<E>: Send + Sync + 'static {
  /// Stage name for logs and metrics.
  fn name(&self) -> &'static str;

  /// Process one event. Errors end at the worker pool's log line.
  async fn handle(&self, event: E) -> Result<(), SagaError>;
}

/// Subscribers of one event type.
pub struct Topic<E> {
  name: &'static str,
  handlers: RwLock<Vec<Arc<dyn EventHandler<E>>>>,
}

impl<E> Topic<E> {
  fn new(name: &'static str) -> Self {
    Self {
      name,
      handlers: RwLock::new(Vec::new()),
    }
  }

  fn snapshot(&self) -> Vec<Arc<dyn EventHandler<E>>> {
    self
      .handlers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }
}

/// Event types the bus can route.
pub trait Routed: Clone + Send + Sync + 'static {
  /// Topic this event type is delivered on.
  fn topic(bus: &EventBus) -> &Topic<Self>;

  /// User the event belongs to.
  fn user_id(&self) -> uuid::Uuid;
}

macro_rules! routed {
  ($event:ty, $field:ident) => {
    impl Routed for $event {
      fn topic(bus: &EventBus) -> &Topic<Self> {
        &bus.$field
      }

      fn user_id(&self) -> uuid::Uuid {
        self.user_id
      }
    }
  };
}

routed!(WalletProvisioned, wallet_provisioned);
routed!(DepositAddressProvisioned, deposit_address_provisioned);
routed!(LedgerProvisioned, ledger_provisioned);
routed!(AssetsGenerationTriggered, assets_generation_triggered);

/// Process-wide publish/subscribe router for saga events.
pub struct EventBus {
  pool: Arc<WorkerPool>,
  metrics: Arc<dyn MetricsSink>,
  wallet_provisioned: Topic<WalletProvisioned>,
  deposit_address_provisioned: Topic<DepositAddressProvisioned>,
  ledger_provisioned: Topic<LedgerProvisioned>,
  assets_generation_triggered: Topic<AssetsGenerationTriggered>,
}

impl EventBus {
  /// Create a bus dispatching onto `pool`.
  pub fn new(pool: Arc<WorkerPool>, metrics: Arc<dyn MetricsSink>) -> Self {
    Self {
      pool,
      metrics,
      wallet_provisioned: Topic::new("wallet_provisioned"),
      deposit_address_provisioned: Topic::new("deposit_address_provisioned"),
      ledger_provisioned: Topic::new("ledger_provisioned"),
      assets_generation_triggered: Topic::new("assets_generation_triggered"),
    }
  }

  /// Register `handler` for events of type `E`.
  pub fn subscribe<E: Routed>(&self, handler: Arc<dyn EventHandler<E>>) {
    let topic = E::topic(self);
    debug!(topic = topic.name, handler = handler.name(), "Subscriber registered");
    topic
      .handlers
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .push(handler);
  }

  /// Number of subscribers for events of type `E`.
  pub fn subscriber_count<E: Routed>(&self) -> usize {
    E::topic(self).snapshot().len()
  }

  /// Spawn one task per subscriber and return how many were spawned.
  pub fn dispatch<E: Routed>(&self, event: E) -> usize {
    let topic = E::topic(self);
    let handlers = topic.snapshot();
    let user_id = event.user_id();

    if handlers.is_empty() {
      warn!(topic = topic.name, user_id = %user_id, "No subscribers, event dropped");
    }

    let mut spawned = 0;
    for handler in handlers {
      let event = event.clone();
      let stage = handler.name();
      if self
        .pool
        .spawn(stage, user_id, async move { handler.handle(event).await })
      {
        spawned += 1;
      }
    }

    self.metrics.event_published(topic.name, spawned);
    debug!(topic = topic.name, user_id = %user_id, subscribers = spawned, "Event published");
    spawned
  }
}

impl EventPublisher for EventBus {
  fn publish(&self, event: SagaEvent) {
    match event {
      SagaEvent::WalletProvisioned(e) => self.dispatch(e),
      SagaEvent::DepositAddressProvisioned(e) => self.dispatch(e),
      SagaEvent::LedgerProvisioned(e) => self.dispatch(e),
      SagaEvent::AssetsGenerationTriggered(e) => self.dispatch(e),
    };
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::Utc;
  use uuid::Uuid;

  use crate::ports::metrics::NoopMetrics;

  struct Counting {
    name: &'static str,
    seen: Arc<AtomicUsize>,
    fail: bool,
  }

  #[async_trait]
  impl EventHandler<LedgerProvisioned> for Counting {
    fn name(&self) -> &'static str {
      self.name
    }

    async fn handle(&self, _event: LedgerProvisioned) -> Result<(), SagaError> {
      self.seen.fetch_add(1, Ordering::SeqCst);
      if self.fail {
        return Err(SagaError::external("credential", "down"));
      }
      Ok(())
    }
  }

  fn ledger_event() -> LedgerProvisioned {
    LedgerProvisioned {
      user_id: Uuid::new_v4(),
      custody_wallet_address: "0xwallet".into(),
      deposit_address: "0xuda".into(),
      ledger_identity_id: "idt".into(),
      ledger_balance_id: "bln".into(),
      email: "a@b.c".into(),
      external_auth_issuer: "Raw=".into(),
      external_auth_token: "token".into(),
      timestamp: Utc::now(),
    }
  }

  fn bus() -> (Arc<WorkerPool>, EventBus) {
    let pool = Arc::new(WorkerPool::new(4, Arc::new(NoopMetrics)));
    let bus = EventBus::new(Arc::clone(&pool), Arc::new(NoopMetrics));
    (pool, bus)
  }

  #[tokio::test]
  async fn test_publish_reaches_every_subscriber_of_the_type_only() {
    let (pool, bus) = bus();
    let seen = Arc::new(AtomicUsize::new(0));

    bus.subscribe::<LedgerProvisioned>(Arc::new(Counting {
      name: "first",
      seen: Arc::clone(&seen),
      fail: true,
    }));
    bus.subscribe::<LedgerProvisioned>(Arc::new(Counting {
      name: "second",
      seen: Arc::clone(&seen),
      fail: false,
    }));

    assert_eq!(bus.subscriber_count::<LedgerProvisioned>(), 2);
    assert_eq!(bus.subscriber_count::<WalletProvisioned>(), 0);

    bus.publish(SagaEvent::from(ledger_event()));
    pool.wait_idle().await;

    // Both ran although the first one failed.
    assert_eq!(seen.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_event_without_subscribers_is_dropped() {
    let (pool, bus) = bus();
    assert_eq!(bus.dispatch(ledger_event()), 0);
    pool.wait_idle().await;
  }
}
