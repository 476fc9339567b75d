//! Credential Port - Login Account Provisioning

use async_trait::async_trait;

use crate::domain::error::SagaError;

/// Identity provider holding the user's login account.
#[async_trait]
pub trait CredentialService: Send + Sync + 'static {
  /// Create the account if it does not exist yet.
  ///
  /// An existing account may be reported as `Ok(())` or as
  /// `SagaError::UserAlreadyExists`; callers treat both as success.
  async fn create_user_if_absent(&self, username: &str, email: &str) -> Result<(), SagaError>;

  /// Set a permanent password on the account.
  async fn set_password(&self, username: &str, password: &str) -> Result<(), SagaError>;
}
