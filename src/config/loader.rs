//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::{AppConfig, ServiceEndpoint};

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    service = %config.service.name,
    max_concurrent_tasks = config.saga.max_concurrent_tasks,
    currency = %config.saga.ledger_currency,
    backend = ?config.persistence.backend,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty collaborator URLs and positive client limits
/// - Positive saga limits
/// - Non-empty provisioning constants (token, currency, ledger, realm)
fn validate_config(config: &AppConfig) -> Result<()> {
  anyhow::ensure!(
    !config.service.name.trim().is_empty(),
    "service.name must not be empty"
  );

  // Saga validation
  let saga = &config.saga;
  anyhow::ensure!(
    saga.max_concurrent_tasks > 0,
    "saga.max_concurrent_tasks must be positive"
  );
  anyhow::ensure!(
    !saga.ledger_currency.trim().is_empty(),
    "saga.ledger_currency must not be empty"
  );
  anyhow::ensure!(
    !saga.destination_token_address.trim().is_empty(),
    "saga.destination_token_address must not be empty"
  );
  anyhow::ensure!(
    saga.save_retry_attempts > 0,
    "saga.save_retry_attempts must be positive"
  );
  anyhow::ensure!(
    saga.supervisor_interval_secs > 0,
    "saga.supervisor_interval_secs must be positive"
  );
  anyhow::ensure!(
    saga.supervisor_batch_size > 0,
    "saga.supervisor_batch_size must be positive"
  );

  // Collaborator validation
  for (name, endpoint) in [
    ("wallet_service", &config.wallet_service.endpoint),
    ("deposit_address", &config.deposit_address.endpoint),
    ("ledger", &config.ledger.endpoint),
    ("credential", &config.credential.endpoint),
    ("storage", &config.storage.endpoint),
    ("renderer", &config.renderer.endpoint),
  ] {
    validate_endpoint(name, endpoint)?;
  }

  anyhow::ensure!(
    !config.ledger.ledger_id.trim().is_empty(),
    "ledger.ledger_id must not be empty"
  );
  anyhow::ensure!(
    !config.credential.realm.trim().is_empty(),
    "credential.realm must not be empty"
  );
  anyhow::ensure!(
    !config.storage.bucket.trim().is_empty(),
    "storage.bucket must not be empty"
  );
  anyhow::ensure!(
    config.storage.public_base_url.starts_with("http"),
    "storage.public_base_url must be an http(s) URL, got {:?}",
    config.storage.public_base_url
  );
  anyhow::ensure!(
    config.renderer.qr_size > 0 && config.renderer.avatar_size > 0,
    "renderer sizes must be positive"
  );

  Ok(())
}

fn validate_endpoint(name: &str, endpoint: &ServiceEndpoint) -> Result<()> {
  anyhow::ensure!(
    endpoint.base_url.starts_with("http://") || endpoint.base_url.starts_with("https://"),
    "{name}.base_url must be an http(s) URL, got {:?}",
    endpoint.base_url
  );
  anyhow::ensure!(endpoint.timeout_ms > 0, "{name}.timeout_ms must be positive");
  anyhow::ensure!(
    endpoint.max_concurrent > 0,
    "{name}.max_concurrent must be positive"
  );
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::PersistenceBackend;

  const SAMPLE: &str = r#"
[service]
name = "onboarding"

[saga]
destination_token_address = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"

[wallet_service]
base_url = "https://wallets.internal"

[deposit_address]
base_url = "https://uda.internal"

[ledger]
base_url = "https://ledger.internal"
ledger_id = "ldg_main"

[credential]
base_url = "https://auth.internal"
realm = "markets"

[storage]
base_url = "https://storage.internal"
bucket = "onboarding-assets"
public_base_url = "https://cdn.internal"

[renderer]
base_url = "https://qr.internal"
max_retries = 0
"#;

  #[test]
  fn test_load_nonexistent_file() {
    let result = load_config("nonexistent.toml");
    assert!(result.is_err());
  }

  #[test]
  fn test_defaults_fill_in() {
    let config = parse_config(SAMPLE).unwrap();
    assert_eq!(config.saga.ledger_currency, "USDC");
    assert_eq!(config.deposit_address.destination_chain_id, 8453);
    assert_eq!(config.credential.admin_client_id, "admin-cli");
    assert_eq!(config.persistence.backend, PersistenceBackend::Json);
    assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    assert_eq!(config.wallet_service.endpoint.max_retries, 2);
    assert_eq!(config.renderer.endpoint.max_retries, 0);
  }

  #[test]
  fn test_empty_destination_token_rejected() {
    let broken = SAMPLE.replace(
      "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913",
      "",
    );
    let err = parse_config(&broken).unwrap_err();
    assert!(err.to_string().contains("destination_token_address"));
  }

  #[test]
  fn test_non_http_base_url_rejected() {
    let broken = SAMPLE.replace("https://ledger.internal", "ledger.internal");
    let err = parse_config(&broken).unwrap_err();
    assert!(err.to_string().contains("ledger.base_url"));
  }

  #[test]
  fn test_memory_backend() {
    let config = parse_config(&format!("{SAMPLE}\n[persistence]\nbackend = \"memory\"\n")).unwrap();
    assert_eq!(config.persistence.backend, PersistenceBackend::Memory);
  }
}
