//! Credential Provisioning Use Case (terminal)
//!
//! Consumes `LedgerProvisioned`: ensures the login account exists under
//! the normalized username, sets its password to the external auth
//! token, then stamps `credential_provisioned_at` on the row. Publishes
//! nothing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::domain::error::SagaError;
use crate::domain::events::LedgerProvisioned;
use crate::domain::user::ProvisioningStage;
use crate::domain::username::normalize_username;
use crate::ports::credential::CredentialService;
use crate::ports::user_repository::UserRepository;

use super::event_bus::EventHandler;
use super::user_record::{record_failure, update_user};

const STAGE: &str = "credential";

/// Credential stage: ensure the login credential.
pub struct CredentialProvisioning<C: CredentialService, R: UserRepository> {
  credentials: Arc<C>,
  users: Arc<R>,
  save_attempts: u32,
}

impl<C: CredentialService, R: UserRepository> CredentialProvisioning<C, R> {
  pub fn new(credentials: Arc<C>, users: Arc<R>, save_attempts: u32) -> Self {
    Self {
      credentials,
      users,
      save_attempts,
    }
  }

  async fn provision(&self, event: &LedgerProvisioned) -> Result<(), SagaError> {
    let username = normalize_username(&event.external_auth_issuer);
    if username.is_empty() {
      return Err(SagaError::Validation(
        "external auth issuer normalizes to an empty username".to_string(),
      ));
    }
    // Resumed sagas carry no token: the token is never persisted.
    if event.external_auth_token.is_empty() {
      return Err(SagaError::Validation(
        "no initial password available for credential".to_string(),
      ));
    }

    match self
      .credentials
      .create_user_if_absent(&username, &event.email)
      .await
    {
      Ok(()) => debug!(user_id = %event.user_id, "Credential account ensured"),
      Err(e) if e.is_already_exists() => {
        debug!(user_id = %event.user_id, "Credential account already exists");
      }
      Err(e) => return Err(e),
    }

    self
      .credentials
      .set_password(&username, &event.external_auth_token)
      .await?;

    let now = Utc::now();
    let marked = update_user(self.users.as_ref(), event.user_id, self.save_attempts, |row| {
      row.credential_provisioned_at = Some(now);
      row.advance_to(ProvisioningStage::CredentialProvisioned);
      Ok(())
    })
    .await;

    // The account is live either way; only the local marker is missing.
    if let Err(e) = marked {
      warn!(user_id = %event.user_id, error = %e, "Credential provisioned but not recorded on user");
    }

    info!(user_id = %event.user_id, "Credential provisioned, onboarding complete");
    Ok(())
  }
}

#[async_trait]
impl<C: CredentialService, R: UserRepository> EventHandler<LedgerProvisioned>
  for CredentialProvisioning<C, R>
{
  fn name(&self) -> &'static str {
    STAGE
  }

  #[instrument(skip_all, fields(stage = STAGE, user_id = %event.user_id))]
  async fn handle(&self, event: LedgerProvisioned) -> Result<(), SagaError> {
    let result = self.provision(&event).await;
    if let Err(e) = &result {
      record_failure(self.users.as_ref(), event.user_id, STAGE, e).await;
    }
    result
  }
}
