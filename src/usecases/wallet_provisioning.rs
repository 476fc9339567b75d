//! Wallet Provisioning Use Case - Registration Entry Point
//!
//! The only synchronous stage. Registration flow:
//! 1. Validate input, normalize the signer EOA
//! 2. Reject a duplicate email or external auth issuer, unless it is a
//!    retry of a registration whose wallet call failed
//! 3. Insert the row with every provisioning field empty
//! 4. Ask the wallet service for the custody wallet, store it
//! 5. Publish `WalletProvisioned` and answer the caller
//!
//! A failure here fails the registration and leaves the row at
//! `Registered`; the same email and issuer may register again and pick
//! up that row. Everything after step 5 is fire-and-forget and cannot
//! change the response.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::domain::events::WalletProvisioned;
use crate::domain::masking::{mask_address, mask_email};
use crate::domain::user::{normalize_signer_address, ProvisioningStage, User};
use crate::ports::events::EventPublisher;
use crate::ports::user_repository::UserRepository;
use crate::ports::wallet::{CustodyWalletService, WalletRequest};

use super::user_record::{record_failure, update_user};

const STAGE: &str = "wallet";

/// Authenticated identity asking to be onboarded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
  /// Login email.
  pub email: String,
  /// Issuer claim from the external auth provider.
  pub external_auth_issuer: String,
  /// External auth token; forwarded to the wallet service and later
  /// used as the initial credential password.
  pub external_auth_token: String,
  /// Signer EOA from the external auth provider.
  pub signer_address: String,
  /// Optional display username.
  #[serde(default)]
  pub username: Option<String>,
}

/// What the caller gets back before the rest of the saga runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
  pub user_id: Uuid,
  pub email: String,
  pub signer_address: String,
  pub custody_wallet_address: String,
  pub current_stage: ProvisioningStage,
  pub created_at: DateTime<Utc>,
}

/// Register the user and assign the custody wallet.
pub struct WalletProvisioning<W: CustodyWalletService, R: UserRepository> {
  wallets: Arc<W>,
  users: Arc<R>,
  publisher: Arc<dyn EventPublisher>,
  save_attempts: u32,
}

impl<W: CustodyWalletService, R: UserRepository> WalletProvisioning<W, R> {
  pub fn new(
    wallets: Arc<W>,
    users: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    save_attempts: u32,
  ) -> Self {
    Self {
      wallets,
      users,
      publisher,
      save_attempts,
    }
  }

  /// Register a new user and kick off the provisioning saga.
  #[instrument(skip_all, fields(email = %mask_email(&request.email)))]
  pub async fn register(
    &self,
    request: RegistrationRequest,
  ) -> Result<RegistrationResponse, SagaError> {
    validate(&request)?;
    let signer_address = normalize_signer_address(&request.signer_address)?;

    let username = request.username.clone().filter(|u| !u.trim().is_empty());
    let user = match self.users.find_by_issuer(&request.external_auth_issuer).await? {
      Some(existing) if is_retry(&existing, &request) => {
        info!(user_id = %existing.id, "Resuming registration without a custody wallet");
        update_user(self.users.as_ref(), existing.id, self.save_attempts, |row| {
          row.signer_address = signer_address.clone();
          row.username = username.clone();
          Ok(())
        })
        .await?
      }
      Some(_) => {
        return Err(SagaError::UserAlreadyExists("external auth issuer".to_string()));
      }
      None => {
        if self.users.exists_by_email(&request.email).await? {
          return Err(SagaError::UserAlreadyExists(mask_email(&request.email)));
        }
        let mut user = User::new(
          request.email.trim(),
          request.external_auth_issuer.as_str(),
          signer_address.as_str(),
        );
        user.username = username;
        let user = self.users.insert(&user).await?;
        info!(user_id = %user.id, "User registered");
        user
      }
    };

    let wallet_request = WalletRequest {
      user_id: user.id,
      signer_address: signer_address.clone(),
      external_auth_token: request.external_auth_token.clone(),
    };
    let custody_wallet_address = match self.wallets.provision_wallet(&wallet_request).await {
      Ok(address) if !address.trim().is_empty() => address,
      Ok(_) => {
        let err = SagaError::external("wallet", "empty custody wallet address");
        record_failure(self.users.as_ref(), user.id, STAGE, &err).await;
        return Err(err);
      }
      Err(e) => {
        warn!(user_id = %user.id, error = %e, "Custody wallet provisioning failed");
        record_failure(self.users.as_ref(), user.id, STAGE, &e).await;
        return Err(e);
      }
    };

    let now = Utc::now();
    let saved = update_user(self.users.as_ref(), user.id, self.save_attempts, |row| {
      row.custody_wallet_address = Some(custody_wallet_address.clone());
      row.wallet_verified_at = Some(now);
      row.advance_to(ProvisioningStage::WalletProvisioned);
      Ok(())
    })
    .await?;

    info!(
      user_id = %saved.id,
      custody_wallet = %mask_address(&custody_wallet_address),
      "Custody wallet assigned"
    );

    self.publisher.publish(
      WalletProvisioned {
        user_id: saved.id,
        email: saved.email.clone(),
        custody_wallet_address: custody_wallet_address.clone(),
        external_auth_issuer: saved.external_auth_issuer.clone(),
        external_auth_token: request.external_auth_token,
        timestamp: now,
      }
      .into(),
    );

    Ok(RegistrationResponse {
      user_id: saved.id,
      email: saved.email,
      signer_address: saved.signer_address,
      custody_wallet_address,
      current_stage: saved.current_stage,
      created_at: saved.created_at,
    })
  }
}

/// Same identity coming back after its wallet call failed.
fn is_retry(existing: &User, request: &RegistrationRequest) -> bool {
  existing.current_stage == ProvisioningStage::Registered
    && existing.custody_wallet_address.is_none()
    && existing.email.eq_ignore_ascii_case(request.email.trim())
}

fn validate(request: &RegistrationRequest) -> Result<(), SagaError> {
  let email = request.email.trim();
  let at = email.find('@').unwrap_or(0);
  if at == 0 || at + 1 >= email.len() {
    return Err(SagaError::Validation("email is not valid".to_string()));
  }
  if request.external_auth_issuer.trim().is_empty() {
    return Err(SagaError::Validation("external auth issuer is required".to_string()));
  }
  if request.external_auth_token.trim().is_empty() {
    return Err(SagaError::Validation("external auth token is required".to_string()));
  }
  Ok(())
}
