//! Ledger Port - Identity and Balance Provisioning
//!
//! The double-entry ledger models a user as an identity that owns
//! one balance per currency.

use std::collections::BTreeMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::error::SagaError;

/// Identity creation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRequest {
  /// User the identity represents.
  pub user_id: Uuid,
  /// User email.
  pub email: String,
  /// Free-form metadata stored on the identity.
  pub metadata: BTreeMap<String, String>,
}

/// One balance owned by an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerBalance {
  /// Balance id.
  pub balance_id: String,
  /// Currency code, e.g. `USDC`.
  pub currency: String,
  /// Current amount.
  pub amount: Decimal,
}

/// Ledger service.
#[async_trait]
pub trait LedgerService: Send + Sync + 'static {
  /// Create an identity and return its id.
  async fn create_identity(&self, request: &IdentityRequest) -> Result<String, SagaError>;

  /// Create a balance in `currency` for the identity and return its id.
  async fn create_balance(&self, identity_id: &str, currency: &str) -> Result<String, SagaError>;

  /// List every balance the identity owns.
  async fn balances_by_identity(&self, identity_id: &str) -> Result<Vec<LedgerBalance>, SagaError>;
}
