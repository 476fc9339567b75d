//! Service HTTP Client - Bounded, Retrying REST Client
//!
//! Wraps reqwest with a concurrency limit and exponential-backoff
//! retries for every provisioning collaborator. Retries cover transport
//! errors, 429 and 5xx only; any other non-2xx status is returned at
//! once as an `ApiStatusError` inside the `anyhow` chain.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::ServiceEndpoint;

/// Configuration for one collaborator's HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
  /// Base URL, without trailing slash.
  pub base_url: String,
  /// Per-request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum retries on transient errors.
  pub max_retries: u32,
  /// Base delay between retries (exponential backoff).
  pub retry_base_delay: Duration,
}

impl Default for HttpClientConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost:8080".to_string(),
      timeout: Duration::from_secs(30),
      max_concurrent: 10,
      max_retries: 2,
      retry_base_delay: Duration::from_millis(500),
    }
  }
}

impl From<&ServiceEndpoint> for HttpClientConfig {
  fn from(endpoint: &ServiceEndpoint) -> Self {
    Self {
      base_url: endpoint.base_url.trim_end_matches('/').to_string(),
      timeout: Duration::from_millis(endpoint.timeout_ms),
      max_concurrent: endpoint.max_concurrent,
      max_retries: endpoint.max_retries,
      retry_base_delay: Duration::from_millis(endpoint.retry_base_delay_ms),
    }
  }
}

/// Non-retryable, non-2xx answer from a collaborator.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {body}")]
pub struct ApiStatusError {
  /// Response status.
  pub status: StatusCode,
  /// Response body, truncated to `MAX_ERROR_BODY` characters.
  pub body: String,
}

/// Status code carried by an error returned from `HttpClient::send`.
pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
  err.downcast_ref::<ApiStatusError>().map(|e| e.status)
}

const MAX_ERROR_BODY: usize = 512;

/// Concurrency-limited HTTP client for one collaborator.
pub struct HttpClient {
  http: Client,
  config: HttpClientConfig,
  semaphore: Arc<Semaphore>,
}

impl HttpClient {
  /// Create a new client.
  pub fn new(config: HttpClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    Ok(Self {
      http,
      config,
      semaphore,
    })
  }

  /// Base URL requests are resolved against.
  pub fn base_url(&self) -> &str {
    &self.config.base_url
  }

  /// Start a request. `path` is appended to the base URL unless it is
  /// already absolute.
  pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
    let url = if path.starts_with("http://") || path.starts_with("https://") {
      path.to_string()
    } else {
      format!("{}{}", self.config.base_url, path)
    };
    self.http.request(method, url)
  }

  /// Send with concurrency limiting and retries; returns the 2xx response.
  pub async fn send(&self, request: RequestBuilder, label: &str) -> Result<Response> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .context("Semaphore closed")?;

    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let delay = self.config.retry_base_delay * 2u32.pow(attempt - 1);
        debug!(label, attempt, delay_ms = delay.as_millis(), "Retrying request");
        sleep(delay).await;
      }

      let req = request
        .try_clone()
        .context("Failed to clone request")?;

      match req.send().await {
        Ok(response) => match response.status() {
          status if status.is_success() => return Ok(response),
          StatusCode::TOO_MANY_REQUESTS => {
            warn!(label, attempt, "Rate limited, backing off");
            last_error = Some(anyhow::anyhow!("{label}: rate limited"));
          }
          status if status.is_server_error() => {
            warn!(label, status = %status, attempt, "Server error, retrying");
            last_error = Some(anyhow::anyhow!("{label}: server error {status}"));
          }
          status => {
            let text = response.text().await.unwrap_or_default();
            let body = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(
              anyhow::Error::new(ApiStatusError { status, body }).context(format!("{label} rejected")),
            );
          }
        },
        Err(e) => {
          warn!(label, error = %e, attempt, "Request failed");
          last_error = Some(anyhow::Error::new(e).context(format!("{label} request failed")));
        }
      }
    }

    Err(last_error.unwrap_or_else(|| anyhow::anyhow!("{label}: max retries exceeded")))
  }

  /// Send and decode a JSON body.
  pub async fn send_json<T: DeserializeOwned>(
    &self,
    request: RequestBuilder,
    label: &str,
  ) -> Result<T> {
    let response = self.send(request, label).await?;
    response
      .json::<T>()
      .await
      .with_context(|| format!("{label}: malformed response body"))
  }
}
