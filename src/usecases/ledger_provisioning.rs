//! Ledger Provisioning Use Case
//!
//! Consumes `DepositAddressProvisioned` and makes sure the user owns a
//! ledger identity and one balance in the target currency. Safe to
//! redeliver:
//!
//! - identity set, balance in the currency exists: nothing to do
//! - identity set, no such balance: create the balance only
//! - no identity: create identity, save it, create balance, save it
//!
//! `LedgerProvisioned` is published only when a balance was created and
//! recorded. Runs for the same user are serialized in-process, and a
//! balance id already on the row is never replaced.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::domain::events::{DepositAddressProvisioned, LedgerProvisioned};
use crate::domain::user::{ProvisioningStage, User};
use crate::ports::events::EventPublisher;
use crate::ports::ledger::{IdentityRequest, LedgerService};
use crate::ports::user_repository::UserRepository;

use super::event_bus::EventHandler;
use super::user_record::{record_failure, update_user};

const STAGE: &str = "ledger";

/// Ledger stage: ensure the ledger identity and balance.
pub struct LedgerProvisioning<L: LedgerService, R: UserRepository> {
  ledger: Arc<L>,
  users: Arc<R>,
  publisher: Arc<dyn EventPublisher>,
  currency: String,
  save_attempts: u32,
  user_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl<L: LedgerService, R: UserRepository> LedgerProvisioning<L, R> {
  pub fn new(
    ledger: Arc<L>,
    users: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    currency: impl Into<String>,
    save_attempts: u32,
  ) -> Self {
    Self {
      ledger,
      users,
      publisher,
      currency: currency.into(),
      save_attempts,
      user_locks: Mutex::new(HashMap::new()),
    }
  }

  /// Run `provision` with no other run for the same user in between.
  async fn provision_exclusive(&self, event: &DepositAddressProvisioned) -> Result<(), SagaError> {
    let lock = {
      let mut locks = self.user_locks.lock().await;
      Arc::clone(locks.entry(event.user_id).or_default())
    };

    let result = {
      let _guard = lock.lock().await;
      self.provision(event).await
    };

    let mut locks = self.user_locks.lock().await;
    // Map entry plus ours: nobody else is waiting.
    if Arc::strong_count(&lock) == 2 {
      locks.remove(&event.user_id);
    }
    drop(lock);
    drop(locks);
    result
  }

  async fn provision(&self, event: &DepositAddressProvisioned) -> Result<(), SagaError> {
    let user = self
      .users
      .find_by_id(event.user_id)
      .await?
      .ok_or(SagaError::UserNotFound(event.user_id))?;

    let identity_id = match user.ledger_identity_id.clone() {
      Some(identity_id) => {
        if self.balance_exists(&user, &identity_id).await? {
          return Ok(());
        }
        info!(user_id = %user.id, "Ledger identity present without balance, creating balance only");
        identity_id
      }
      None => self.create_identity(event).await?,
    };

    let balance_id = self.ledger.create_balance(&identity_id, &self.currency).await?;
    info!(user_id = %event.user_id, currency = %self.currency, "Ledger balance created");

    let now = Utc::now();
    let saved = update_user(self.users.as_ref(), event.user_id, self.save_attempts, |row| {
      if row.ledger_balance_id.is_none() {
        row.ledger_balance_id = Some(balance_id.clone());
        row.ledger_created_at = Some(now);
        row.advance_to(ProvisioningStage::LedgerProvisioned);
      }
      Ok(())
    })
    .await?;

    if saved.ledger_balance_id.as_deref() != Some(balance_id.as_str()) {
      warn!(
        user_id = %event.user_id,
        orphaned_balance_id = %balance_id,
        "Another run already recorded a ledger balance, keeping it"
      );
      return Ok(());
    }

    self.publisher.publish(
      LedgerProvisioned {
        user_id: event.user_id,
        custody_wallet_address: event.custody_wallet_address.clone(),
        deposit_address: event.deposit_address.clone(),
        ledger_identity_id: identity_id,
        ledger_balance_id: balance_id,
        email: event.email.clone(),
        external_auth_issuer: event.external_auth_issuer.clone(),
        external_auth_token: event.external_auth_token.clone(),
        timestamp: now,
      }
      .into(),
    );

    Ok(())
  }

  /// Whether the identity already owns a balance in the target currency.
  ///
  /// A balance found on the ledger but missing from the row is written
  /// back (no event), so the row stops looking stalled.
  async fn balance_exists(&self, user: &User, identity_id: &str) -> Result<bool, SagaError> {
    let balances = self.ledger.balances_by_identity(identity_id).await?;
    let Some(existing) = balances
      .into_iter()
      .find(|b| b.currency == self.currency)
    else {
      return Ok(false);
    };

    if user.ledger_balance_id.is_none() {
      warn!(user_id = %user.id, "Ledger balance exists but was never recorded, backfilling");
      let now = Utc::now();
      update_user(self.users.as_ref(), user.id, self.save_attempts, |row| {
        if row.ledger_balance_id.is_none() {
          row.ledger_balance_id = Some(existing.balance_id.clone());
          row.ledger_created_at = Some(now);
          row.advance_to(ProvisioningStage::LedgerProvisioned);
        }
        Ok(())
      })
      .await?;
    } else {
      debug!(user_id = %user.id, "Ledger already provisioned, skipping");
    }

    Ok(true)
  }

  /// Create the identity and save it; returns the identity id on record.
  async fn create_identity(&self, event: &DepositAddressProvisioned) -> Result<String, SagaError> {
    let mut metadata = BTreeMap::new();
    metadata.insert("deposit_address".to_string(), event.deposit_address.clone());
    metadata.insert("custody_wallet_address".to_string(), event.custody_wallet_address.clone());
    metadata.insert("user_id".to_string(), event.user_id.to_string());

    let created = self
      .ledger
      .create_identity(&IdentityRequest {
        user_id: event.user_id,
        email: event.email.clone(),
        metadata,
      })
      .await?;

    let saved = update_user(self.users.as_ref(), event.user_id, self.save_attempts, |row| {
      match &row.ledger_identity_id {
        Some(existing) if existing != &created => {
          warn!(
            user_id = %row.id,
            "Concurrent run already recorded a ledger identity, keeping it"
          );
        }
        Some(_) => {}
        None => row.ledger_identity_id = Some(created.clone()),
      }
      Ok(())
    })
    .await?;

    info!(user_id = %event.user_id, "Ledger identity created");
    saved
      .ledger_identity_id
      .ok_or_else(|| SagaError::Storage("ledger identity id not persisted".to_string()))
  }
}

#[async_trait]
impl<L: LedgerService, R: UserRepository> EventHandler<DepositAddressProvisioned>
  for LedgerProvisioning<L, R>
{
  fn name(&self) -> &'static str {
    STAGE
  }

  #[instrument(skip_all, fields(stage = STAGE, user_id = %event.user_id))]
  async fn handle(&self, event: DepositAddressProvisioned) -> Result<(), SagaError> {
    let result = self.provision_exclusive(&event).await;
    if let Err(e) = &result {
      record_failure(self.users.as_ref(), event.user_id, STAGE, e).await;
    }
    result
  }
}
