//! JSON User Store - One Atomic File per User
//!
//! Rows live in `{data_dir}/users/{id}.json`. Every write goes to a
//! `.json.tmp` sibling first and is then renamed over the real file, so
//! a crash leaves either the old or the new row, never a partial one.
//!
//! All rows are loaded into a `UserTable` at startup; the table is the
//! read path and the compare-and-swap authority, the files are the
//! durable copy. Writes hold the table lock across the file write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::SagaError;
use crate::domain::user::User;
use crate::ports::user_repository::UserRepository;

use super::memory::UserTable;

/// File-backed user repository.
pub struct JsonUserStore {
    dir: PathBuf,
    table: Mutex<UserTable>,
}

impl JsonUserStore {
    /// Open the store under `data_dir`, creating it if needed and loading
    /// every existing row.
    pub async fn open(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir).join("users");
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create user directory {}", dir.display()))?;

        let rows = Self::load_all(&dir).await?;
        info!(path = %dir.display(), users = rows.len(), "User store opened");

        Ok(Self {
            dir,
            table: Mutex::new(UserTable::from_rows(rows)),
        })
    }

    async fn load_all(dir: &Path) -> Result<Vec<User>> {
        let mut rows = Vec::new();
        let mut entries = fs::read_dir(dir)
            .await
            .context("Failed to list user directory")?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            match serde_json::from_str::<User>(&json) {
                Ok(user) => rows.push(user),
                // A corrupt row must not keep the service down.
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable user file"),
            }
        }

        Ok(rows)
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Write one row atomically (tmp, then rename).
    #[instrument(skip(self, user), fields(user_id = %user.id, version = user.version))]
    async fn write_row(&self, user: &User) -> Result<()> {
        let path = self.path_for(user.id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(user).context("Failed to serialize user")?;

        fs::write(&tmp, &json)
            .await
            .context("Failed to write tmp user file")?;
        fs::rename(&tmp, &path)
            .await
            .context("Failed to rename user file")?;

        Ok(())
    }

    /// Whether the user directory is still accessible.
    pub async fn is_healthy(&self) -> bool {
        fs::metadata(&self.dir).await.is_ok()
    }
}

#[async_trait]
impl UserRepository for JsonUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, SagaError> {
        Ok(self.table.lock().await.get(id))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, SagaError> {
        Ok(self.table.lock().await.has_email(email))
    }

    async fn find_by_issuer(&self, issuer: &str) -> Result<Option<User>, SagaError> {
        Ok(self.table.lock().await.by_issuer(issuer))
    }

    async fn insert(&self, user: &User) -> Result<User, SagaError> {
        let mut table = self.table.lock().await;
        let row = table.prepare_insert(user)?;
        self.write_row(&row)
            .await
            .map_err(|e| SagaError::storage(&e))?;
        table.commit(row.clone());
        Ok(row)
    }

    async fn save(&self, user: &User) -> Result<User, SagaError> {
        let mut table = self.table.lock().await;
        let row = table.prepare_save(user)?;
        self.write_row(&row)
            .await
            .map_err(|e| SagaError::storage(&e))?;
        table.commit(row.clone());
        Ok(row)
    }

    async fn find_stalled(
        &self,
        updated_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<User>, SagaError> {
        Ok(self.table.lock().await.stalled(updated_before, limit))
    }
}
