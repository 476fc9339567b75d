//! Deposit-Address Port - Unified Deposit Address Creation
//!
//! The deposit-address stage requests a unified deposit address plus
//! the per-chain bundle of addresses that forward into it.

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::domain::error::SagaError;

/// Request sent to the deposit-address service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositAddressRequest {
  /// User the address belongs to.
  pub user_id: Uuid,
  /// User email, for service-side bookkeeping.
  pub email: String,
  /// Custody wallet the deposits settle into.
  pub wallet_address: String,
  /// Token the deposits are converted into.
  pub destination_token_address: String,
}

/// What the saga keeps from the service response.
#[derive(Debug, Clone, PartialEq)]
pub struct DepositAddressBundle {
  /// Unified deposit address.
  pub deposit_address: String,
  /// Per-chain addresses exactly as received.
  pub raw: Map<String, Value>,
}

/// Deposit-address service.
#[async_trait]
pub trait DepositAddressService: Send + Sync + 'static {
  /// Create the user's deposit address.
  async fn create_deposit_address(
    &self,
    request: &DepositAddressRequest,
  ) -> Result<DepositAddressBundle, SagaError>;
}
