//! Ledger Adapter
//!
//! Implements `LedgerService` against the double-entry ledger's REST
//! API: `POST /identities`, `POST /balances` and
//! `GET /balances?identity_id=`. Listing errors propagate; an empty list
//! means the identity really has no balances.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::types::{
    BalanceCreateRequest, BalanceList, BalanceMetadata, CreatedResource, IdentityCreateRequest,
};
use crate::domain::error::SagaError;
use crate::ports::ledger::{IdentityRequest, LedgerBalance, LedgerService};

const SERVICE: &str = "ledger";
const API_KEY_HEADER: &str = "X-Blnk-Key";

/// HTTP ledger client bound to one ledger.
pub struct HttpLedgerService {
    client: Arc<HttpClient>,
    ledger_id: String,
    api_key: Option<String>,
}

impl HttpLedgerService {
    pub fn new(client: Arc<HttpClient>, ledger_id: String, api_key: Option<String>) -> Self {
        Self {
            client,
            ledger_id,
            api_key,
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

/// Identity display name: the local part of the email.
fn first_name(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

#[async_trait]
impl LedgerService for HttpLedgerService {
    #[instrument(skip_all, fields(user_id = %request.user_id))]
    async fn create_identity(&self, request: &IdentityRequest) -> Result<String, SagaError> {
        let body = IdentityCreateRequest {
            identity_type: "individual",
            first_name: first_name(&request.email),
            email: &request.email,
            meta_data: &request.metadata,
        };
        let builder = self.authorized(self.client.request(Method::POST, "/identities").json(&body));

        let created: CreatedResource = self
            .client
            .send_json(builder, "identities")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        let identity_id = created
            .identity_id
            .or(created.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SagaError::external(SERVICE, "identity response carried no id"))?;
        debug!(identity_id = %identity_id, "Ledger identity created");
        Ok(identity_id)
    }

    #[instrument(skip(self))]
    async fn create_balance(&self, identity_id: &str, currency: &str) -> Result<String, SagaError> {
        let body = BalanceCreateRequest {
            ledger_id: &self.ledger_id,
            identity_id,
            currency,
            meta_data: BalanceMetadata {
                kind: "user_balance",
            },
        };
        let builder = self.authorized(self.client.request(Method::POST, "/balances").json(&body));

        let created: CreatedResource = self
            .client
            .send_json(builder, "balances")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        let balance_id = created
            .balance_id
            .or(created.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SagaError::external(SERVICE, "balance response carried no id"))?;
        debug!(balance_id = %balance_id, "Ledger balance created");
        Ok(balance_id)
    }

    #[instrument(skip(self))]
    async fn balances_by_identity(&self, identity_id: &str) -> Result<Vec<LedgerBalance>, SagaError> {
        let builder = self.authorized(
            self.client
                .request(Method::GET, "/balances")
                .query(&[("identity_id", identity_id)]),
        );

        let listed: BalanceList = self
            .client
            .send_json(builder, "balances?identity_id")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        Ok(listed
            .into_records()
            .into_iter()
            .map(|record| LedgerBalance {
                balance_id: record.balance_id,
                currency: record.currency,
                amount: record.balance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_name_is_local_part() {
        assert_eq!(first_name("alice.smith@example.com"), "alice.smith");
        assert_eq!(first_name("no-at-sign"), "no-at-sign");
    }
}
