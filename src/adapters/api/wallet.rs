//! Custody Wallet Adapter
//!
//! Implements `CustodyWalletService` against the wallet service's
//! `POST /wallets/create`. The user's external auth token is the bearer
//! credential; the service answers with the smart account that fronts
//! the signer EOA.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::types::{DataEnvelope, WalletCreateData, WalletCreateRequest};
use crate::domain::error::SagaError;
use crate::domain::masking::mask_address;
use crate::ports::wallet::{CustodyWalletService, WalletRequest};

const SERVICE: &str = "wallet";

/// HTTP custody wallet service.
pub struct HttpWalletService {
    client: Arc<HttpClient>,
    /// Optional service key, sent as `x-api-key`.
    api_key: Option<String>,
}

impl HttpWalletService {
    pub fn new(client: Arc<HttpClient>, api_key: Option<String>) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl CustodyWalletService for HttpWalletService {
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    async fn provision_wallet(&self, request: &WalletRequest) -> Result<String, SagaError> {
        if request.external_auth_token.is_empty() {
            return Err(SagaError::Validation(
                "external auth token is required for wallet creation".to_string(),
            ));
        }

        let mut builder = self
            .client
            .request(Method::POST, "/wallets/create")
            .bearer_auth(&request.external_auth_token)
            .json(&WalletCreateRequest {
                wallet_address: &request.signer_address,
            });
        if let Some(key) = &self.api_key {
            builder = builder.header("x-api-key", key);
        }

        let envelope: DataEnvelope<WalletCreateData> = self
            .client
            .send_json(builder, "wallets/create")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        let account = envelope
            .data
            .map(|d| d.smart_account)
            .ok_or_else(|| SagaError::external(SERVICE, "response carried no smart account"))?;

        if account.smart_account_address.trim().is_empty() {
            return Err(SagaError::external(SERVICE, "empty smart account address"));
        }

        debug!(
            wallet = %mask_address(&account.smart_account_address),
            deployed = account.deployed,
            chain_id = account.chain_id.unwrap_or_default(),
            "Custody wallet assigned"
        );
        Ok(account.smart_account_address)
    }
}
