//! Credential Adapter - Identity Provider Admin API
//!
//! Implements `CredentialService` with the identity provider's admin
//! REST API:
//! - admin token via password grant on the master realm, cached until
//!   shortly before expiry
//! - `POST /admin/realms/{realm}/users` (409 means the account exists)
//! - `GET /admin/realms/{realm}/users?username=` to resolve the id
//! - `PUT .../users/{id}/reset-password`

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::client::{status_of, HttpClient};
use super::types::{AccessToken, CredentialUser, CredentialUserCreate, PasswordReset};
use crate::domain::error::SagaError;

const SERVICE: &str = "credential";

/// Refresh the admin token this long before the provider expires it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Admin login used to obtain tokens.
#[derive(Clone)]
pub struct AdminCredentials {
    pub client_id: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// HTTP identity-provider client for one realm.
pub struct HttpCredentialService {
    client: Arc<HttpClient>,
    realm: String,
    admin: AdminCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl HttpCredentialService {
    pub fn new(client: Arc<HttpClient>, realm: String, admin: AdminCredentials) -> Self {
        Self {
            client,
            realm,
            admin,
            token: Mutex::new(None),
        }
    }

    async fn admin_token(&self) -> Result<String, SagaError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let builder = self
            .client
            .request(Method::POST, "/realms/master/protocol/openid-connect/token")
            .form(&[
                ("grant_type", "password"),
                ("client_id", self.admin.client_id.as_str()),
                ("username", self.admin.username.as_str()),
                ("password", self.admin.password.as_str()),
            ]);
        let token: AccessToken = self
            .client
            .send_json(builder, "admin token")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        debug!(lifetime_secs = lifetime.as_secs(), "Admin token refreshed");
        Ok(token.access_token)
    }

    async fn user_id(&self, token: &str, username: &str) -> Result<String, SagaError> {
        let builder = self
            .client
            .request(Method::GET, &format!("/admin/realms/{}/users", self.realm))
            .bearer_auth(token)
            .query(&[("username", username), ("exact", "true")]);
        let found: Vec<CredentialUser> = self
            .client
            .send_json(builder, "users?username")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        found
            .into_iter()
            .find(|u| u.username == username)
            .map(|u| u.id)
            .ok_or_else(|| SagaError::external(SERVICE, format!("account {username} not found")))
    }
}

#[async_trait]
impl crate::ports::credential::CredentialService for HttpCredentialService {
    #[instrument(skip(self, email))]
    async fn create_user_if_absent(&self, username: &str, email: &str) -> Result<(), SagaError> {
        let token = self.admin_token().await?;
        let builder = self
            .client
            .request(Method::POST, &format!("/admin/realms/{}/users", self.realm))
            .bearer_auth(&token)
            .json(&CredentialUserCreate {
                username,
                enabled: true,
                email,
                email_verified: true,
            });

        match self.client.send(builder, "users create").await {
            Ok(_) => {
                debug!("Credential account created");
                Ok(())
            }
            Err(e) => Err(create_error(username, &e)),
        }
    }

    #[instrument(skip(self, password))]
    async fn set_password(&self, username: &str, password: &str) -> Result<(), SagaError> {
        let token = self.admin_token().await?;
        let id = self.user_id(&token, username).await?;

        let builder = self
            .client
            .request(
                Method::PUT,
                &format!("/admin/realms/{}/users/{id}/reset-password", self.realm),
            )
            .bearer_auth(&token)
            .json(&PasswordReset {
                kind: "password",
                value: password,
                temporary: false,
            });
        self.client
            .send(builder, "reset-password")
            .await
            .map_err(|e| SagaError::external(SERVICE, format!("{e:#}")))?;

        debug!("Credential password set");
        Ok(())
    }
}

/// 409 on create means the account is already there.
fn create_error(username: &str, err: &anyhow::Error) -> SagaError {
    if status_of(err) == Some(StatusCode::CONFLICT) {
        SagaError::UserAlreadyExists(username.to_string())
    } else {
        SagaError::external(SERVICE, format!("{err:#}"))
    }
}
