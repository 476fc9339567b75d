//! Configuration Module - TOML-based Service Configuration
//!
//! Loads and validates configuration from `config.toml`. Every
//! collaborator URL, the destination token and all saga limits live
//! here; secrets never do (see `secrets`).

pub mod loader;
pub mod secrets;

use serde::Deserialize;

/// Top-level service configuration.
///
/// Loaded from `config.toml` at startup and validated before any
/// component is built.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and logging.
  pub service: ServiceConfig,
  /// HTTP listener.
  #[serde(default)]
  pub server: ServerConfig,
  /// Saga limits and provisioning constants.
  pub saga: SagaConfig,
  /// Custody wallet service.
  pub wallet_service: WalletServiceConfig,
  /// Unified deposit-address service.
  pub deposit_address: DepositAddressConfig,
  /// Double-entry ledger.
  pub ledger: LedgerConfig,
  /// Identity provider holding login credentials.
  pub credential: CredentialConfig,
  /// Public object storage for generated assets.
  pub storage: StorageConfig,
  /// QR rendering service and avatar sizing.
  pub renderer: RendererConfig,
  /// User row persistence.
  #[serde(default)]
  pub persistence: PersistenceConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Human-readable service name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Bind address for registration, probes and metrics.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_address(),
    }
  }
}

/// Saga configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SagaConfig {
  /// Stage tasks allowed to run at once on the worker pool.
  #[serde(default = "default_max_concurrent_tasks")]
  pub max_concurrent_tasks: usize,
  /// Currency of the balance created by the ledger stage.
  #[serde(default = "default_ledger_currency")]
  pub ledger_currency: String,
  /// Token deposits are converted into.
  pub destination_token_address: String,
  /// Compare-and-swap attempts per user row write.
  #[serde(default = "default_save_retry_attempts")]
  pub save_retry_attempts: u32,
  /// Seconds between supervisor sweeps.
  #[serde(default = "default_supervisor_interval")]
  pub supervisor_interval_secs: u64,
  /// A row untouched this long below the terminal stage is stalled.
  #[serde(default = "default_stall_after")]
  pub stall_after_secs: u64,
  /// Users examined per sweep.
  #[serde(default = "default_supervisor_batch")]
  pub supervisor_batch_size: usize,
  /// How long shutdown waits for in-flight stage tasks.
  #[serde(default = "default_drain_timeout")]
  pub shutdown_drain_timeout_secs: u64,
}

/// Connection settings shared by every HTTP collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEndpoint {
  /// Base URL, without trailing slash.
  pub base_url: String,
  /// Per-request timeout (milliseconds).
  #[serde(default = "default_timeout_ms")]
  pub timeout_ms: u64,
  /// Concurrent requests allowed against this service.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// Retries on transport errors, 429 and 5xx.
  #[serde(default = "default_max_retries")]
  pub max_retries: u32,
  /// First retry delay; doubles on every further retry (milliseconds).
  #[serde(default = "default_retry_base_delay")]
  pub retry_base_delay_ms: u64,
}

/// Custody wallet service.
#[derive(Debug, Clone, Deserialize)]
pub struct WalletServiceConfig {
  #[serde(flatten)]
  pub endpoint: ServiceEndpoint,
}

/// Deposit-address service.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositAddressConfig {
  #[serde(flatten)]
  pub endpoint: ServiceEndpoint,
  /// Chain the deposits settle on (Base).
  #[serde(default = "default_destination_chain_id")]
  pub destination_chain_id: u64,
}

/// Ledger service.
#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
  #[serde(flatten)]
  pub endpoint: ServiceEndpoint,
  /// Ledger the user balances are opened in.
  pub ledger_id: String,
}

/// Identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
  #[serde(flatten)]
  pub endpoint: ServiceEndpoint,
  /// Realm user accounts are created in.
  pub realm: String,
  /// Client used for the admin password grant.
  #[serde(default = "default_admin_client_id")]
  pub admin_client_id: String,
}

/// Object storage.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
  #[serde(flatten)]
  pub endpoint: ServiceEndpoint,
  /// Bucket holding avatars and QR codes.
  pub bucket: String,
  /// Public read prefix; objects live at `{public_base_url}/{bucket}/{key}`.
  pub public_base_url: String,
}

/// QR rendering service and avatar sizing.
#[derive(Debug, Clone, Deserialize)]
pub struct RendererConfig {
  #[serde(flatten)]
  pub endpoint: ServiceEndpoint,
  /// QR rendering path under `base_url`.
  #[serde(default = "default_qr_path")]
  pub qr_path: String,
  /// QR edge length in pixels.
  #[serde(default = "default_qr_size")]
  pub qr_size: u32,
  /// Avatar edge length in pixels.
  #[serde(default = "default_avatar_size")]
  pub avatar_size: u32,
}

/// Where user rows are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceBackend {
  /// One JSON file per user under `data_dir`.
  #[default]
  Json,
  /// Process memory only; rows are lost on exit.
  Memory,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  #[serde(default)]
  pub backend: PersistenceBackend,
  /// Directory for user rows.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
}

impl Default for PersistenceConfig {
  fn default() -> Self {
    Self {
      backend: PersistenceBackend::default(),
      data_dir: default_data_dir(),
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_bind_address() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_max_concurrent_tasks() -> usize {
  32
}

fn default_ledger_currency() -> String {
  "USDC".to_string()
}

fn default_save_retry_attempts() -> u32 {
  5
}

fn default_supervisor_interval() -> u64 {
  60
}

fn default_stall_after() -> u64 {
  300
}

fn default_supervisor_batch() -> usize {
  100
}

fn default_drain_timeout() -> u64 {
  30
}

fn default_timeout_ms() -> u64 {
  10_000
}

fn default_max_concurrent() -> usize {
  10
}

fn default_max_retries() -> u32 {
  2
}

fn default_retry_base_delay() -> u64 {
  1_000
}

fn default_destination_chain_id() -> u64 {
  8453
}

fn default_admin_client_id() -> String {
  "admin-cli".to_string()
}

fn default_qr_path() -> String {
  "/v1/create-qr-code/".to_string()
}

fn default_qr_size() -> u32 {
  300
}

fn default_avatar_size() -> u32 {
  200
}

fn default_data_dir() -> String {
  "data".to_string()
}
