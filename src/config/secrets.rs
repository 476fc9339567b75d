//! Collaborator Secrets - Environment Only
//!
//! API keys and admin passwords are read from environment variables
//! (or a `.env` loaded by the process manager) and never from
//! `config.toml`.

use anyhow::{Context, Result};

/// Credentials for the provisioning collaborators.
#[derive(Clone)]
pub struct Secrets {
  /// `WALLET_SERVICE_API_KEY` (optional).
  pub wallet_api_key: Option<String>,
  /// `DEPOSIT_ADDRESS_API_KEY`.
  pub deposit_address_api_key: String,
  /// `LEDGER_API_KEY` (optional).
  pub ledger_api_key: Option<String>,
  /// `CREDENTIAL_ADMIN_USERNAME`.
  pub credential_admin_username: String,
  /// `CREDENTIAL_ADMIN_PASSWORD`.
  pub credential_admin_password: String,
  /// `STORAGE_ACCESS_TOKEN` (optional).
  pub storage_access_token: Option<String>,
}

impl std::fmt::Debug for Secrets {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Secrets")
      .field("wallet_api_key", &self.wallet_api_key.is_some())
      .field("ledger_api_key", &self.ledger_api_key.is_some())
      .field("credential_admin_username", &self.credential_admin_username)
      .field("storage_access_token", &self.storage_access_token.is_some())
      .finish_non_exhaustive()
  }
}

impl Secrets {
  /// Load from the process environment.
  pub fn from_env() -> Result<Self> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Load through `lookup`; empty values count as unset.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let required = |name: &str| optional(name).with_context(|| format!("{name} not set"));

    Ok(Self {
      wallet_api_key: optional("WALLET_SERVICE_API_KEY"),
      deposit_address_api_key: required("DEPOSIT_ADDRESS_API_KEY")?,
      ledger_api_key: optional("LEDGER_API_KEY"),
      credential_admin_username: required("CREDENTIAL_ADMIN_USERNAME")?,
      credential_admin_password: required("CREDENTIAL_ADMIN_PASSWORD")?,
      storage_access_token: optional("STORAGE_ACCESS_TOKEN"),
    })
  }
}
