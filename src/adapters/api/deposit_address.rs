//! Deposit-Address Adapter
//!
//! Implements `DepositAddressService` against
//! `POST /unified-deposit-address/create`. The API key goes in the
//! `Authorization` header as-is (no scheme).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::types::{DataEnvelope, UdaCreateData, UdaCreateRequest};
use crate::domain::error::SagaError;
use crate::domain::masking::mask_address;
use crate::ports::deposit_address::{
    DepositAddressBundle, DepositAddressRequest, DepositAddressService,
};

const SERVICE: &str = "deposit_address";

/// Base mainnet.
pub const DEFAULT_DESTINATION_CHAIN_ID: u64 = 8453;

/// HTTP deposit-address service.
pub struct HttpDepositAddressService {
    client: Arc<HttpClient>,
    api_key: String,
    destination_chain_id: u64,
}

impl HttpDepositAddressService {
    pub fn new(client: Arc<HttpClient>, api_key: String, destination_chain_id: u64) -> Self {
        Self {
            client,
            api_key,
            destination_chain_id,
        }
    }
}

#[async_trait]
impl DepositAddressService for HttpDepositAddressService {
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    async fn create_deposit_address(
        &self,
        request: &DepositAddressRequest,
    ) -> Result<DepositAddressBundle, SagaError> {
        if request.wallet_address.trim().is_empty() {
            return Err(SagaError::Validation("wallet address is required".to_string()));
        }
        if request.destination_token_address.trim().is_empty() {
            return Err(SagaError::Validation(
                "destination token address is required".to_string(),
            ));
        }

        let body = UdaCreateRequest {
            user_id: request.user_id.to_string(),
            email: &request.email,
            destination_chain_id: self.destination_chain_id,
            destination_address: &request.wallet_address,
            destination_token_address: &request.destination_token_address,
        };
        let builder = self
            .client
            .request(Method::POST, "/unified-deposit-address/create")
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&body);

        let envelope: DataEnvelope<UdaCreateData> = self
            .client
            .send_json(builder, "unified-deposit-address/create")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        let data = envelope
            .data
            .ok_or_else(|| SagaError::external(SERVICE, "response carried no data"))?;
        if data.uda_address.trim().is_empty() {
            return Err(SagaError::external(SERVICE, "empty unified deposit address"));
        }

        let raw = data.deposit_addresses.unwrap_or_default();
        debug!(
            uda = %mask_address(&data.uda_address),
            chains = raw.len(),
            status = data.status.as_deref().unwrap_or("unknown"),
            "Deposit address created"
        );

        Ok(DepositAddressBundle {
            deposit_address: data.uda_address,
            raw,
        })
    }
}
