//! In-Memory User Repository
//!
//! `UserTable` holds the compare-and-swap and uniqueness rules; the
//! in-memory repository wraps it in a lock, and the JSON store reuses
//! it as its index.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::domain::masking::mask_email;
use crate::domain::user::User;
use crate::ports::user_repository::UserRepository;

/// Plain map of user rows with the repository's write rules.
#[derive(Debug, Default)]
pub struct UserTable {
    rows: HashMap<Uuid, User>,
}

impl UserTable {
    /// Build a table from rows loaded elsewhere.
    pub fn from_rows(rows: impl IntoIterator<Item = User>) -> Self {
        Self {
            rows: rows.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: Uuid) -> Option<User> {
        self.rows.get(&id).cloned()
    }

    pub fn has_email(&self, email: &str) -> bool {
        self.rows.values().any(|u| u.email.eq_ignore_ascii_case(email))
    }

    pub fn has_issuer(&self, issuer: &str) -> bool {
        self.by_issuer(issuer).is_some()
    }

    pub fn by_issuer(&self, issuer: &str) -> Option<User> {
        self.rows
            .values()
            .find(|u| u.external_auth_issuer == issuer)
            .cloned()
    }

    /// Check uniqueness and build the row to store.
    pub fn prepare_insert(&self, user: &User) -> Result<User, SagaError> {
        if self.rows.contains_key(&user.id) {
            return Err(SagaError::UserAlreadyExists(user.id.to_string()));
        }
        if self.has_email(&user.email) {
            return Err(SagaError::UserAlreadyExists(mask_email(&user.email)));
        }
        if self.has_issuer(&user.external_auth_issuer) {
            return Err(SagaError::UserAlreadyExists("external auth issuer".to_string()));
        }
        Ok(user.clone())
    }

    /// Check the version and build the row to store (version bumped).
    pub fn prepare_save(&self, user: &User) -> Result<User, SagaError> {
        let stored = self
            .rows
            .get(&user.id)
            .ok_or(SagaError::UserNotFound(user.id))?;
        if stored.version != user.version {
            return Err(SagaError::VersionConflict {
                user_id: user.id,
                expected: user.version,
                found: stored.version,
            });
        }
        let mut next = user.clone();
        next.version = stored.version + 1;
        next.updated_at = Utc::now();
        Ok(next)
    }

    /// Store a row produced by `prepare_insert` or `prepare_save`.
    pub fn commit(&mut self, user: User) {
        self.rows.insert(user.id, user);
    }

    pub fn stalled(&self, updated_before: DateTime<Utc>, limit: usize) -> Vec<User> {
        let mut stalled: Vec<User> = self
            .rows
            .values()
            .filter(|u| !u.current_stage.is_terminal() && u.updated_at < updated_before)
            .cloned()
            .collect();
        stalled.sort_by_key(|u| u.updated_at);
        stalled.truncate(limit);
        stalled
    }
}

/// Process-local repository, for tests and the `memory` backend.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    table: RwLock<UserTable>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    /// Whether no user is stored.
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, SagaError> {
        Ok(self.table.read().await.get(id))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, SagaError> {
        Ok(self.table.read().await.has_email(email))
    }

    async fn find_by_issuer(&self, issuer: &str) -> Result<Option<User>, SagaError> {
        Ok(self.table.read().await.by_issuer(issuer))
    }

    async fn insert(&self, user: &User) -> Result<User, SagaError> {
        let mut table = self.table.write().await;
        let row = table.prepare_insert(user)?;
        table.commit(row.clone());
        Ok(row)
    }

    async fn save(&self, user: &User) -> Result<User, SagaError> {
        let mut table = self.table.write().await;
        let row = table.prepare_save(user)?;
        table.commit(row.clone());
        Ok(row)
    }

    async fn find_stalled(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<User>, SagaError> {
        Ok(self.table.read().await.stalled(updated_before, limit))
    }
}
