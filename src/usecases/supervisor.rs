//! Saga Supervisor - Resumption of Stalled Onboarding
//!
//! Stage events are in-memory and at-most-once, so a lost event or a
//! failed stage leaves a user short of the terminal stage forever. The
//! supervisor periodically lists users whose row has not changed for
//! `stall_after` and re-publishes the event that drives their next
//! stage:
//!
//! - `wallet_provisioned` -> `WalletProvisioned` (deposit address again)
//! - `deposit_address_provisioned` -> `DepositAddressProvisioned` (ledger)
//!
//! The external auth token is never persisted, so resumed events carry
//! none. Users stuck before the custody wallet exists, or before the
//! credential, are reported only. A user without a wallet finishes by
//! registering again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::domain::error::SagaError;
use crate::domain::events::{DepositAddressProvisioned, SagaEvent, WalletProvisioned};
use crate::domain::user::{ProvisioningStage, User};
use crate::ports::events::EventPublisher;
use crate::ports::user_repository::UserRepository;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
  /// Users whose next stage was re-published.
  pub resumed: usize,
  /// Stalled users that cannot be resumed automatically.
  pub unresumable: usize,
}

/// Periodic resumer of stalled sagas.
pub struct SagaSupervisor<R: UserRepository> {
  users: Arc<R>,
  publisher: Arc<dyn EventPublisher>,
  interval: Duration,
  stall_after: Duration,
  batch_size: usize,
}

impl<R: UserRepository> SagaSupervisor<R> {
  pub fn new(
    users: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    interval: Duration,
    stall_after: Duration,
    batch_size: usize,
  ) -> Self {
    Self {
      users,
      publisher,
      interval,
      stall_after,
      batch_size,
    }
  }

  /// Run one pass over stalled users.
  #[instrument(skip(self))]
  pub async fn sweep(&self) -> Result<SweepReport, SagaError> {
    let stall_after = chrono::Duration::from_std(self.stall_after)
      .map_err(|e| SagaError::Validation(format!("stall threshold out of range: {e}")))?;
    let cutoff = Utc::now() - stall_after;
    let stalled = self.users.find_stalled(cutoff, self.batch_size).await?;

    let mut report = SweepReport::default();
    for user in &stalled {
      match resume_event(user) {
        Some(event) => {
          info!(
            user_id = %user.id,
            stage = %user.current_stage,
            last_error = user.last_error.as_deref().unwrap_or(""),
            "Resuming stalled saga"
          );
          self.publisher.publish(event);
          report.resumed += 1;
        }
        None => {
          warn!(
            user_id = %user.id,
            stage = %user.current_stage,
            last_error = user.last_error.as_deref().unwrap_or(""),
            "Stalled saga cannot be resumed automatically"
          );
          report.unresumable += 1;
        }
      }
    }

    if !stalled.is_empty() {
      info!(
        resumed = report.resumed,
        unresumable = report.unresumable,
        "Supervisor sweep complete"
      );
    }
    Ok(report)
  }

  /// Sweep every `interval` until shutdown.
  pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
    info!(
      interval_secs = self.interval.as_secs(),
      stall_after_secs = self.stall_after.as_secs(),
      "Saga supervisor started"
    );

    loop {
      tokio::select! {
        biased;
        _ = shutdown_rx.recv() => {
          info!("Saga supervisor received shutdown signal");
          break;
        }
        () = tokio::time::sleep(self.interval) => {
          if let Err(e) = self.sweep().await {
            warn!(error = %e, "Supervisor sweep failed");
          }
        }
      }
    }
  }
}

/// Event that drives the next stage for `user`, if it can be rebuilt
/// from the row alone.
fn resume_event(user: &User) -> Option<SagaEvent> {
  match user.current_stage {
    ProvisioningStage::WalletProvisioned => {
      let custody_wallet_address = user.custody_wallet_address.clone()?;
      Some(
        WalletProvisioned {
          user_id: user.id,
          email: user.email.clone(),
          custody_wallet_address,
          external_auth_issuer: user.external_auth_issuer.clone(),
          external_auth_token: String::new(),
          timestamp: Utc::now(),
        }
        .into(),
      )
    }
    ProvisioningStage::DepositAddressProvisioned => Some(
      DepositAddressProvisioned {
        user_id: user.id,
        email: user.email.clone(),
        custody_wallet_address: user.custody_wallet_address.clone()?,
        deposit_address: user.deposit_address.clone()?,
        external_auth_issuer: user.external_auth_issuer.clone(),
        external_auth_token: String::new(),
        timestamp: Utc::now(),
      }
      .into(),
    ),
    ProvisioningStage::Registered
    | ProvisioningStage::LedgerProvisioned
    | ProvisioningStage::CredentialProvisioned => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  use crate::adapters::persistence::InMemoryUserRepository;

  #[derive(Default)]
  struct Recorder(Mutex<Vec<SagaEvent>>);

  impl EventPublisher for Recorder {
    fn publish(&self, event: SagaEvent) {
      self.0.lock().unwrap().push(event);
    }
  }

  fn at_stage(email: &str, stage: ProvisioningStage) -> User {
    let mut user = User::new(email, email, "0xabc");
    user.current_stage = stage;
    if stage >= ProvisioningStage::WalletProvisioned {
      user.custody_wallet_address = Some("0xcustody".into());
    }
    if stage >= ProvisioningStage::DepositAddressProvisioned {
      user.deposit_address = Some("0xuda".into());
    }
    user
  }

  #[tokio::test]
  async fn test_sweep_resumes_resumable_stages_only() {
    let users = Arc::new(InMemoryUserRepository::new());
    for (email, stage) in [
      ("a@x.io", ProvisioningStage::Registered),
      ("b@x.io", ProvisioningStage::WalletProvisioned),
      ("c@x.io", ProvisioningStage::DepositAddressProvisioned),
      ("d@x.io", ProvisioningStage::LedgerProvisioned),
      ("e@x.io", ProvisioningStage::CredentialProvisioned),
    ] {
      users.insert(&at_stage(email, stage)).await.unwrap();
    }

    let recorder = Arc::new(Recorder::default());
    let supervisor = SagaSupervisor::new(
      Arc::clone(&users),
      recorder.clone() as Arc<dyn EventPublisher>,
      Duration::from_secs(60),
      Duration::ZERO,
      100,
    );

    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = supervisor.sweep().await.unwrap();
    assert_eq!(
      report,
      SweepReport {
        resumed: 2,
        unresumable: 2,
      }
    );

    let events = recorder.0.lock().unwrap();
    assert!(events.iter().any(|e| matches!(e, SagaEvent::WalletProvisioned(_))));
    assert!(events
      .iter()
      .any(|e| matches!(e, SagaEvent::DepositAddressProvisioned(d) if d.external_auth_token.is_empty())));
  }

  #[tokio::test]
  async fn test_recent_rows_are_left_alone() {
    let users = Arc::new(InMemoryUserRepository::new());
    users
      .insert(&at_stage("a@x.io", ProvisioningStage::WalletProvisioned))
      .await
      .unwrap();

    let recorder = Arc::new(Recorder::default());
    let supervisor = SagaSupervisor::new(
      users,
      recorder.clone() as Arc<dyn EventPublisher>,
      Duration::from_secs(60),
      Duration::from_secs(3600),
      100,
    );

    assert_eq!(supervisor.sweep().await.unwrap(), SweepReport::default());
    assert!(recorder.0.lock().unwrap().is_empty());
  }
}
