//! Object Storage Port - Public Asset Uploads

use async_trait::async_trait;

use crate::domain::error::SagaError;

/// Bucket-style object storage with public read URLs.
#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
  /// Upload `bytes` under `key` and return the public URL.
  async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, SagaError>;
}
