//! Object Storage Adapter
//!
//! Implements `ObjectStorage` with a bucket-style media upload:
//! `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={key}`.
//! Objects are publicly readable at `{public_base_url}/{bucket}/{key}`.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{header, Method};
use tracing::{debug, instrument};

use super::client::HttpClient;
use crate::domain::error::SagaError;
use crate::ports::storage::ObjectStorage;

const SERVICE: &str = "storage";

/// HTTP object storage bound to one bucket.
pub struct HttpObjectStorage {
    client: Arc<HttpClient>,
    bucket: String,
    public_base_url: String,
    access_token: Option<String>,
}

impl HttpObjectStorage {
    pub fn new(
        client: Arc<HttpClient>,
        bucket: String,
        public_base_url: &str,
        access_token: Option<String>,
    ) -> Self {
        Self {
            client,
            bucket,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            access_token,
        }
    }

    /// Public URL of an uploaded object.
    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url, self.bucket, key)
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, SagaError> {
        if key.is_empty() || key.starts_with('/') {
            return Err(SagaError::Validation(format!("invalid object key {key:?}")));
        }

        let mut builder = self
            .client
            .request(
                Method::POST,
                &format!("/upload/storage/v1/b/{}/o", self.bucket),
            )
            .query(&[("uploadType", "media"), ("name", key)])
            .header(header::CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        self.client
            .send(builder, "object upload")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        let url = self.public_url(key);
        debug!(url = %url, "Object uploaded");
        Ok(url)
    }
}
