//! Saga stage events.
//!
//! Immutable and denormalized: each event carries what the next stage
//! needs so the common path never re-reads the previous stage's output.
//! Events live in memory only; a crash between an external call and the
//! publish loses that transition (the supervisor exists for that).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Emitted by registration once the custody wallet is assigned and saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletProvisioned {
    pub user_id: Uuid,
    pub email: String,
    pub custody_wallet_address: String,
    pub external_auth_issuer: String,
    pub external_auth_token: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitted once the deposit-address bundle is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositAddressProvisioned {
    pub user_id: Uuid,
    pub email: String,
    pub custody_wallet_address: String,
    pub deposit_address: String,
    pub external_auth_issuer: String,
    pub external_auth_token: String,
    pub timestamp: DateTime<Utc>,
}

/// Emitted by the ledger stage once identity and balance are both recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerProvisioned {
    pub user_id: Uuid,
    pub custody_wallet_address: String,
    pub deposit_address: String,
    pub ledger_identity_id: String,
    pub ledger_balance_id: String,
    pub email: String,
    /// Raw external auth id, normalized into the credential username.
    pub external_auth_issuer: String,
    /// Initial credential password.
    pub external_auth_token: String,
    pub timestamp: DateTime<Utc>,
}

/// Hand-off from the deposit-address stage to the asset-generation branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetsGenerationTriggered {
    pub user_id: Uuid,
    pub custody_wallet_address: String,
    pub deposit_address: String,
    pub raw_deposit_address_bundle: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Every event variant the bus routes, tagged by type on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SagaEvent {
    WalletProvisioned(WalletProvisioned),
    DepositAddressProvisioned(DepositAddressProvisioned),
    LedgerProvisioned(LedgerProvisioned),
    AssetsGenerationTriggered(AssetsGenerationTriggered),
}

impl SagaEvent {
    /// User the event belongs to.
    pub const fn user_id(&self) -> Uuid {
        match self {
            Self::WalletProvisioned(e) => e.user_id,
            Self::DepositAddressProvisioned(e) => e.user_id,
            Self::LedgerProvisioned(e) => e.user_id,
            Self::AssetsGenerationTriggered(e) => e.user_id,
        }
    }

    /// Topic name for logs and metrics.
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::WalletProvisioned(_) => "wallet_provisioned",
            Self::DepositAddressProvisioned(_) => "deposit_address_provisioned",
            Self::LedgerProvisioned(_) => "ledger_provisioned",
            Self::AssetsGenerationTriggered(_) => "assets_generation_triggered",
        }
    }
}

impl From<WalletProvisioned> for SagaEvent {
    fn from(e: WalletProvisioned) -> Self {
        Self::WalletProvisioned(e)
    }
}

impl From<DepositAddressProvisioned> for SagaEvent {
    fn from(e: DepositAddressProvisioned) -> Self {
        Self::DepositAddressProvisioned(e)
    }
}

impl From<LedgerProvisioned> for SagaEvent {
    fn from(e: LedgerProvisioned) -> Self {
        Self::LedgerProvisioned(e)
    }
}

impl From<AssetsGenerationTriggered> for SagaEvent {
    fn from(e: AssetsGenerationTriggered) -> Self {
        Self::AssetsGenerationTriggered(e)
    }
}
