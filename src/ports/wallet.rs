//! Custody Wallet Port - Smart-Account Assignment
//!
//! Registration asks the wallet service for the custody (smart) wallet that
//! fronts the user's signer EOA.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::error::SagaError;

/// Everything the wallet service needs to assign a custody wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletRequest {
  /// User the wallet is for.
  pub user_id: Uuid,
  /// Normalized signer EOA (`0x` + lowercase hex).
  pub signer_address: String,
  /// External auth token, forwarded as the bearer credential.
  pub external_auth_token: String,
}

/// Custody wallet service.
#[async_trait]
pub trait CustodyWalletService: Send + Sync + 'static {
  /// Create (or fetch) the custody wallet and return its address.
  async fn provision_wallet(&self, request: &WalletRequest) -> Result<String, SagaError>;
}
