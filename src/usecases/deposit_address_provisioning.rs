//! Deposit-Address Provisioning Use Case
//!
//! Consumes `WalletProvisioned`:
//! 1. Request the deposit-address bundle for the custody wallet
//! 2. Store the address, ACTIVE status and raw bundle on the user row
//! 3. Publish `DepositAddressProvisioned` (drives the ledger stage)
//! 4. Hand the bundle straight to asset generation on the
//!    worker pool; that branch is not routed through the bus
//!
//! Any failure stops the saga for this user. A bundle that cannot be
//! encoded is not a failure: the row is saved without it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::domain::error::SagaError;
use crate::domain::events::{AssetsGenerationTriggered, DepositAddressProvisioned, WalletProvisioned};
use crate::domain::masking::mask_address;
use crate::domain::user::{DepositAddressStatus, ProvisioningStage};
use crate::ports::deposit_address::{DepositAddressRequest, DepositAddressService};
use crate::ports::events::EventPublisher;
use crate::ports::user_repository::UserRepository;

use super::event_bus::EventHandler;
use super::user_record::{record_failure, update_user};
use super::worker_pool::WorkerPool;

const STAGE: &str = "deposit_address";

/// Deposit-address stage: create and store the user's deposit address.
pub struct DepositAddressProvisioning<D: DepositAddressService, R: UserRepository> {
  deposits: Arc<D>,
  users: Arc<R>,
  publisher: Arc<dyn EventPublisher>,
  pool: Arc<WorkerPool>,
  assets: Arc<dyn EventHandler<AssetsGenerationTriggered>>,
  destination_token_address: String,
  save_attempts: u32,
}

impl<D: DepositAddressService, R: UserRepository> DepositAddressProvisioning<D, R> {
  pub fn new(
    deposits: Arc<D>,
    users: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    pool: Arc<WorkerPool>,
    assets: Arc<dyn EventHandler<AssetsGenerationTriggered>>,
    destination_token_address: impl Into<String>,
    save_attempts: u32,
  ) -> Self {
    Self {
      deposits,
      users,
      publisher,
      pool,
      assets,
      destination_token_address: destination_token_address.into(),
      save_attempts,
    }
  }

  async fn provision(&self, event: &WalletProvisioned) -> Result<(), SagaError> {
    let request = DepositAddressRequest {
      user_id: event.user_id,
      email: event.email.clone(),
      wallet_address: event.custody_wallet_address.clone(),
      destination_token_address: self.destination_token_address.clone(),
    };
    let bundle = self.deposits.create_deposit_address(&request).await?;
    if bundle.deposit_address.trim().is_empty() {
      return Err(SagaError::external("deposit_address", "response has no deposit address"));
    }

    let raw_bundle = match serde_json::to_string(&bundle.raw) {
      Ok(json) => Some(json),
      Err(e) => {
        warn!(user_id = %event.user_id, error = %e, "Deposit bundle not encodable, saving without it");
        None
      }
    };

    let now = Utc::now();
    let saved = update_user(self.users.as_ref(), event.user_id, self.save_attempts, |user| {
      user.deposit_address = Some(bundle.deposit_address.clone());
      user.deposit_address_status = DepositAddressStatus::Active;
      user.deposit_address_created_at = Some(now);
      if let Some(raw) = &raw_bundle {
        user.raw_deposit_address_bundle = Some(raw.clone());
      }
      user.advance_to(ProvisioningStage::DepositAddressProvisioned);
      Ok(())
    })
    .await?;

    info!(
      user_id = %saved.id,
      deposit_address = %mask_address(&bundle.deposit_address),
      chains = bundle.raw.len(),
      "Deposit address stored"
    );

    self.publisher.publish(
      DepositAddressProvisioned {
        user_id: saved.id,
        email: event.email.clone(),
        custody_wallet_address: event.custody_wallet_address.clone(),
        deposit_address: bundle.deposit_address.clone(),
        external_auth_issuer: event.external_auth_issuer.clone(),
        external_auth_token: event.external_auth_token.clone(),
        timestamp: now,
      }
      .into(),
    );

    self.trigger_assets(AssetsGenerationTriggered {
      user_id: saved.id,
      custody_wallet_address: event.custody_wallet_address.clone(),
      deposit_address: bundle.deposit_address,
      raw_deposit_address_bundle: bundle.raw,
      timestamp: now,
    });

    Ok(())
  }

  fn trigger_assets(&self, trigger: AssetsGenerationTriggered) {
    let assets = Arc::clone(&self.assets);
    let user_id = trigger.user_id;
    self
      .pool
      .spawn(assets.name(), user_id, async move { assets.handle(trigger).await });
  }
}

#[async_trait]
impl<D: DepositAddressService, R: UserRepository> EventHandler<WalletProvisioned>
  for DepositAddressProvisioning<D, R>
{
  fn name(&self) -> &'static str {
    STAGE
  }

  #[instrument(skip_all, fields(stage = STAGE, user_id = %event.user_id))]
  async fn handle(&self, event: WalletProvisioned) -> Result<(), SagaError> {
    let result = self.provision(&event).await;
    if let Err(e) = &result {
      record_failure(self.users.as_ref(), event.user_id, STAGE, e).await;
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;
  use std::sync::atomic::{AtomicUsize, Ordering};

  use serde_json::json;

  use crate::adapters::persistence::InMemoryUserRepository;
  use crate::domain::events::SagaEvent;
  use crate::domain::user::User;
  use crate::ports::deposit_address::DepositAddressBundle;
  use crate::ports::metrics::NoopMetrics;

  struct FixedDeposit(Result<DepositAddressBundle, SagaError>);

  #[async_trait]
  impl DepositAddressService for FixedDeposit {
    async fn create_deposit_address(
      &self,
      _request: &DepositAddressRequest,
    ) -> Result<DepositAddressBundle, SagaError> {
      self.0.clone()
    }
  }

  #[derive(Default)]
  struct Recorder(Mutex<Vec<SagaEvent>>);

  impl EventPublisher for Recorder {
    fn publish(&self, event: SagaEvent) {
      self.0.lock().unwrap().push(event);
    }
  }

  #[derive(Default)]
  struct CountingAssets(AtomicUsize);

  #[async_trait]
  impl EventHandler<AssetsGenerationTriggered> for CountingAssets {
    fn name(&self) -> &'static str {
      "assets"
    }

    async fn handle(&self, _event: AssetsGenerationTriggered) -> Result<(), SagaError> {
      self.0.fetch_add(1, Ordering::SeqCst);
      Ok(())
    }
  }

  struct Fixture {
    stage: DepositAddressProvisioning<FixedDeposit, InMemoryUserRepository>,
    users: Arc<InMemoryUserRepository>,
    recorder: Arc<Recorder>,
    assets: Arc<CountingAssets>,
    pool: Arc<WorkerPool>,
  }

  fn fixture(response: Result<DepositAddressBundle, SagaError>) -> Fixture {
    let users = Arc::new(InMemoryUserRepository::new());
    let recorder = Arc::new(Recorder::default());
    let assets = Arc::new(CountingAssets::default());
    let pool = Arc::new(WorkerPool::new(4, Arc::new(NoopMetrics)));
    let stage = DepositAddressProvisioning::new(
      Arc::new(FixedDeposit(response)),
      Arc::clone(&users),
      recorder.clone() as Arc<dyn EventPublisher>,
      Arc::clone(&pool),
      assets.clone() as Arc<dyn EventHandler<AssetsGenerationTriggered>>,
      "0xusdc",
      3,
    );
    Fixture {
      stage,
      users,
      recorder,
      assets,
      pool,
    }
  }

  fn wallet_event(user_id: uuid::Uuid) -> WalletProvisioned {
    WalletProvisioned {
      user_id,
      email: "alice@example.com".into(),
      custody_wallet_address: "0xcustody".into(),
      external_auth_issuer: "AliceId=".into(),
      external_auth_token: "token".into(),
      timestamp: Utc::now(),
    }
  }

  fn bundle() -> DepositAddressBundle {
    DepositAddressBundle {
      deposit_address: "0xuda".into(),
      raw: json!({"8453": {"address": "0xbase"}})
        .as_object()
        .cloned()
        .unwrap(),
    }
  }

  async fn registered(users: &InMemoryUserRepository) -> User {
    let mut user = User::new("alice@example.com", "AliceId=", "0xabc");
    user.custody_wallet_address = Some("0xcustody".into());
    users.insert(&user).await.unwrap()
  }

  #[tokio::test]
  async fn test_stores_bundle_publishes_and_triggers_assets() {
    let f = fixture(Ok(bundle()));
    let user = registered(&f.users).await;

    f.stage.handle(wallet_event(user.id)).await.unwrap();
    f.pool.wait_idle().await;

    let row = f.users.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(row.deposit_address.as_deref(), Some("0xuda"));
    assert_eq!(row.deposit_address_status, DepositAddressStatus::Active);
    assert!(row.raw_deposit_address_bundle.unwrap().contains("0xbase"));
    assert_eq!(row.current_stage, ProvisioningStage::DepositAddressProvisioned);

    let events = f.recorder.0.lock().unwrap();
    assert!(matches!(
      events.as_slice(),
      [SagaEvent::DepositAddressProvisioned(e)] if e.deposit_address == "0xuda"
    ));
    assert_eq!(f.assets.0.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_service_failure_publishes_nothing() {
    let f = fixture(Err(SagaError::external("deposit_address", "timeout")));
    let user = registered(&f.users).await;

    assert!(f.stage.handle(wallet_event(user.id)).await.is_err());
    f.pool.wait_idle().await;

    let row = f.users.find_by_id(user.id).await.unwrap().unwrap();
    assert!(row.deposit_address.is_none());
    assert!(row.last_error.unwrap().starts_with("deposit_address:"));
    assert!(f.recorder.0.lock().unwrap().is_empty());
    assert_eq!(f.assets.0.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_missing_user_aborts() {
    let f = fixture(Ok(bundle()));
    let ghost = uuid::Uuid::new_v4();

    let err = f.stage.handle(wallet_event(ghost)).await.unwrap_err();
    assert_eq!(err, SagaError::UserNotFound(ghost));
    assert!(f.recorder.0.lock().unwrap().is_empty());
    assert_eq!(f.assets.0.load(Ordering::SeqCst), 0);
  }
}
