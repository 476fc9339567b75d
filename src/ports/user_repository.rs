//! User Repository Port - Provisioning State Persistence
//!
//! The user row is the only shared mutable state in the saga. Every
//! save is a compare-and-swap on `User::version`: a writer that read an
//! older version gets `SagaError::VersionConflict` and must re-read.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::domain::user::User;

/// Storage for user rows.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
  /// Load a user by id. `Ok(None)` when the row does not exist.
  async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, SagaError>;

  /// Whether a row with this email exists (case-insensitive).
  async fn exists_by_email(&self, email: &str) -> Result<bool, SagaError>;

  /// Load the row registered under this external auth issuer.
  async fn find_by_issuer(&self, issuer: &str) -> Result<Option<User>, SagaError>;

  /// Insert a new row.
  ///
  /// # Errors
  /// `UserAlreadyExists` if the id, email or issuer is taken.
  async fn insert(&self, user: &User) -> Result<User, SagaError>;

  /// Save a row read earlier.
  ///
  /// Succeeds only if the stored version still equals `user.version`;
  /// the returned row carries the bumped version and `updated_at`.
  async fn save(&self, user: &User) -> Result<User, SagaError>;

  /// Users below the terminal stage whose row has not changed since
  /// `updated_before`, oldest first, at most `limit`.
  async fn find_stalled(
    &self,
    updated_before: DateTime<Utc>,
    limit: usize,
  ) -> Result<Vec<User>, SagaError>;
}
