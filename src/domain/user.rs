//! User aggregate and provisioning state machine.
//!
//! The user row is the single source of truth for how far onboarding got.
//! Each stage owns one field group and writes only that group. The
//! `current_stage` / `last_error` pair makes a stalled saga visible and
//! resumable; `version` guards every save with compare-and-swap.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SagaError;

// ────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────

/// Lifecycle of the user's deposit address at the deposit-address service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositAddressStatus {
    /// Not provisioned yet.
    #[default]
    Pending,
    /// Provisioned and monitored for deposits.
    Active,
    /// Temporarily disabled by operations.
    Suspended,
    /// Permanently closed.
    Closed,
}

/// How far the sequential saga chain has progressed for a user.
///
/// Ordered: a user can only move forward. Asset generation is a parallel
/// leaf and is not part of this chain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStage {
    /// Row created, nothing provisioned.
    #[default]
    Registered,
    /// Custody wallet assigned.
    WalletProvisioned,
    /// Deposit-address bundle stored.
    DepositAddressProvisioned,
    /// Ledger identity and balance exist.
    LedgerProvisioned,
    /// Login credential exists with its password set (terminal).
    CredentialProvisioned,
}

impl ProvisioningStage {
    /// Whether the sequential chain is finished for this user.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::CredentialProvisioned)
    }

    /// Stable label for logs and metrics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::WalletProvisioned => "wallet_provisioned",
            Self::DepositAddressProvisioned => "deposit_address_provisioned",
            Self::LedgerProvisioned => "ledger_provisioned",
            Self::CredentialProvisioned => "credential_provisioned",
        }
    }
}

impl std::fmt::Display for ProvisioningStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────
// Field groups
// ────────────────────────────────────────────

/// Generated avatar and QR-code URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAssets {
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// QR code of the custody wallet address.
    pub custody_wallet_qr_url: Option<String>,
    /// QR code of the unified deposit address.
    pub deposit_address_qr_url: Option<String>,
    /// EVM deposit QR codes by chain name.
    #[serde(default)]
    pub evm_deposit_qr_urls: BTreeMap<String, String>,
    /// Solana deposit QR code.
    pub solana_deposit_qr_url: Option<String>,
    /// Bitcoin deposit QR codes by address format.
    #[serde(default)]
    pub bitcoin_deposit_qr_urls: BTreeMap<String, String>,
}

impl UserAssets {
    /// Whether any asset URL is present.
    pub fn is_empty(&self) -> bool {
        self.avatar_url.is_none()
            && self.custody_wallet_qr_url.is_none()
            && self.deposit_address_qr_url.is_none()
            && self.evm_deposit_qr_urls.is_empty()
            && self.solana_deposit_qr_url.is_none()
            && self.bitcoin_deposit_qr_urls.is_empty()
    }

    /// Copy every non-empty field of `generated` over `self`.
    ///
    /// Fields that failed to generate stay as they were.
    pub fn merge_from(&mut self, generated: &Self) {
        fn take(dst: &mut Option<String>, src: &Option<String>) {
            if let Some(v) = src.as_ref().filter(|v| !v.is_empty()) {
                *dst = Some(v.clone());
            }
        }
        take(&mut self.avatar_url, &generated.avatar_url);
        take(&mut self.custody_wallet_qr_url, &generated.custody_wallet_qr_url);
        take(&mut self.deposit_address_qr_url, &generated.deposit_address_qr_url);
        take(&mut self.solana_deposit_qr_url, &generated.solana_deposit_qr_url);
        for (k, v) in &generated.evm_deposit_qr_urls {
            self.evm_deposit_qr_urls.insert(k.clone(), v.clone());
        }
        for (k, v) in &generated.bitcoin_deposit_qr_urls {
            self.bitcoin_deposit_qr_urls.insert(k.clone(), v.clone());
        }
    }
}

// ────────────────────────────────────────────
// Aggregate
// ────────────────────────────────────────────

/// The user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Primary key.
    pub id: Uuid,
    /// Login email.
    pub email: String,
    /// Display username.
    pub username: Option<String>,
    /// Raw external auth id (issuer claim). Unique per person and the
    /// source of the credential username.
    pub external_auth_issuer: String,
    /// Signer EOA reported by the external auth provider.
    pub signer_address: String,

    // Wallet
    /// Custody (smart) wallet address.
    pub custody_wallet_address: Option<String>,
    /// When the custody wallet was assigned.
    pub wallet_verified_at: Option<DateTime<Utc>>,

    // Deposit address
    /// Unified deposit address.
    pub deposit_address: Option<String>,
    /// Deposit-address lifecycle.
    #[serde(default)]
    pub deposit_address_status: DepositAddressStatus,
    /// When the deposit address was stored.
    pub deposit_address_created_at: Option<DateTime<Utc>>,
    /// Raw per-chain bundle, JSON-encoded as received.
    pub raw_deposit_address_bundle: Option<String>,

    // Ledger
    /// Ledger identity id.
    pub ledger_identity_id: Option<String>,
    /// Ledger balance id in the target currency.
    pub ledger_balance_id: Option<String>,
    /// When the ledger balance was stored.
    pub ledger_created_at: Option<DateTime<Utc>>,

    // Credential
    /// When the credential account was ensured and its password set.
    pub credential_provisioned_at: Option<DateTime<Utc>>,

    // Assets
    /// Generated asset URLs.
    #[serde(default)]
    pub assets: UserAssets,

    // Saga bookkeeping
    /// Furthest stage reached.
    #[serde(default)]
    pub current_stage: ProvisioningStage,
    /// Last stage failure, cleared on the next successful advance.
    pub last_error: Option<String>,
    /// Optimistic concurrency version, bumped by every save.
    #[serde(default)]
    pub version: u64,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
    /// Last save time.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a freshly registered row: every provisioning field empty.
    pub fn new(
        email: impl Into<String>,
        external_auth_issuer: impl Into<String>,
        signer_address: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            username: None,
            external_auth_issuer: external_auth_issuer.into(),
            signer_address: signer_address.into(),
            custody_wallet_address: None,
            wallet_verified_at: None,
            deposit_address: None,
            deposit_address_status: DepositAddressStatus::Pending,
            deposit_address_created_at: None,
            raw_deposit_address_bundle: None,
            ledger_identity_id: None,
            ledger_balance_id: None,
            ledger_created_at: None,
            credential_provisioned_at: None,
            assets: UserAssets::default(),
            current_stage: ProvisioningStage::Registered,
            last_error: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the state machine forward to `stage`; never moves backwards.
    /// A successful advance clears `last_error`.
    pub fn advance_to(&mut self, stage: ProvisioningStage) {
        if stage > self.current_stage {
            self.current_stage = stage;
        }
        self.last_error = None;
    }

    /// Record a stage failure without moving the state machine.
    pub fn record_failure(&mut self, stage: &str, error: &str) {
        self.last_error = Some(format!("{stage}: {error}"));
    }

    /// Stage derived purely from which field groups are populated.
    pub fn derived_stage(&self) -> ProvisioningStage {
        if self.custody_wallet_address.is_none() {
            ProvisioningStage::Registered
        } else if self.deposit_address.is_none() {
            ProvisioningStage::WalletProvisioned
        } else if self.ledger_balance_id.is_none() {
            ProvisioningStage::DepositAddressProvisioned
        } else if self.credential_provisioned_at.is_none() {
            ProvisioningStage::LedgerProvisioned
        } else {
            ProvisioningStage::CredentialProvisioned
        }
    }

    /// No later field group is populated unless the one before it is.
    pub fn field_groups_are_ordered(&self) -> bool {
        let wallet = self.custody_wallet_address.is_some();
        let deposit = self.deposit_address.is_some();
        let identity = self.ledger_identity_id.is_some();
        let balance = self.ledger_balance_id.is_some();
        let credential = self.credential_provisioned_at.is_some();

        (!deposit || wallet)
            && (!identity || deposit)
            && (!balance || identity)
            && (!credential || balance)
    }
}

/// Normalize a signer EOA: lowercase, `0x` prefix, 40 hex digits.
pub fn normalize_signer_address(raw: &str) -> Result<String, SagaError> {
    let trimmed = raw.trim().to_lowercase();
    let hex = trimmed.strip_prefix("0x").unwrap_or(&trimmed);
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SagaError::Validation(format!(
            "signer address is not a 20-byte hex address: {raw:?}"
        )));
    }
    Ok(format!("0x{hex}"))
}
