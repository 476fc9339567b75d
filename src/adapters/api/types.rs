//! Collaborator Wire Types
//!
//! Request and response bodies for the provisioning services. Only the
//! fields the saga sends or keeps are modelled; everything else in a
//! response is ignored.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ────────────────────────────────────────────
// Envelopes
// ────────────────────────────────────────────

/// `{"success": true, "data": {...}}` wrapper used by several services.
#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
  pub data: Option<T>,
}

// ────────────────────────────────────────────
// Custody wallet service
// ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCreateRequest<'a> {
  pub wallet_address: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletCreateData {
  pub smart_account: SmartAccount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmartAccount {
  pub smart_account_address: String,
  #[serde(default)]
  pub deployed: bool,
  #[serde(default)]
  pub chain_id: Option<u64>,
}

// ────────────────────────────────────────────
// Deposit-address service
// ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UdaCreateRequest<'a> {
  pub user_id: String,
  pub email: &'a str,
  pub destination_chain_id: u64,
  pub destination_address: &'a str,
  pub destination_token_address: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UdaCreateData {
  pub uda_address: String,
  #[serde(default)]
  pub deposit_addresses: Option<Map<String, Value>>,
  #[serde(default)]
  pub status: Option<String>,
}

// ────────────────────────────────────────────
// Ledger
// ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct IdentityCreateRequest<'a> {
  pub identity_type: &'static str,
  pub first_name: &'a str,
  pub email: &'a str,
  pub meta_data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceCreateRequest<'a> {
  pub ledger_id: &'a str,
  pub identity_id: &'a str,
  pub currency: &'a str,
  pub meta_data: BalanceMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceMetadata {
  #[serde(rename = "type")]
  pub kind: &'static str,
}

/// Identity or balance creation answer: the id comes as `identity_id` /
/// `balance_id`, or as plain `id` on older ledger versions.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatedResource {
  #[serde(default)]
  pub identity_id: Option<String>,
  #[serde(default)]
  pub balance_id: Option<String>,
  #[serde(default)]
  pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRecord {
  #[serde(alias = "id")]
  pub balance_id: String,
  pub currency: String,
  #[serde(default)]
  pub balance: Decimal,
}

/// Balance listing: a bare array or `{"data": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum BalanceList {
  Bare(Vec<BalanceRecord>),
  Wrapped { data: Vec<BalanceRecord> },
}

impl BalanceList {
  pub fn into_records(self) -> Vec<BalanceRecord> {
    match self {
      Self::Bare(records) | Self::Wrapped { data: records } => records,
    }
  }
}

// ────────────────────────────────────────────
// Credential service
// ────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
  pub access_token: String,
  #[serde(default = "default_expires_in")]
  pub expires_in: u64,
}

fn default_expires_in() -> u64 {
  60
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUserCreate<'a> {
  pub username: &'a str,
  pub enabled: bool,
  pub email: &'a str,
  pub email_verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialUser {
  pub id: String,
  pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PasswordReset<'a> {
  #[serde(rename = "type")]
  pub kind: &'static str,
  pub value: &'a str,
  pub temporary: bool,
}
