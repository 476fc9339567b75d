//! API Server - Registration, Probes and Metrics
//!
//! axum 0.7 router:
//! - `POST /register`: registration, answers once the custody wallet exists
//! - `GET /live`: 200 while the process runs
//! - `GET /ready`: 503 once shutdown has started
//! - `GET /metrics`: Prometheus text exposition
//!
//! Registration is refused with 503 while draining so no new saga
//! starts after the worker pool has been closed.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::adapters::metrics::SagaMetrics;
use crate::domain::error::SagaError;
use crate::ports::user_repository::UserRepository;
use crate::ports::wallet::CustodyWalletService;
use crate::usecases::wallet_provisioning::{RegistrationRequest, WalletProvisioning};

/// Shared handler state.
pub struct ServerState<W: CustodyWalletService, R: UserRepository> {
    registration: Arc<WalletProvisioning<W, R>>,
    metrics: Arc<SagaMetrics>,
    ready: watch::Receiver<bool>,
}

impl<W: CustodyWalletService, R: UserRepository> Clone for ServerState<W, R> {
    fn clone(&self) -> Self {
        Self {
            registration: Arc::clone(&self.registration),
            metrics: Arc::clone(&self.metrics),
            ready: self.ready.clone(),
        }
    }
}

/// HTTP front door of the onboarding service.
pub struct ApiServer<W: CustodyWalletService, R: UserRepository> {
    state: ServerState<W, R>,
    bind_address: String,
}

impl<W: CustodyWalletService, R: UserRepository> ApiServer<W, R> {
    pub fn new(
        registration: Arc<WalletProvisioning<W, R>>,
        metrics: Arc<SagaMetrics>,
        ready: watch::Receiver<bool>,
        bind_address: String,
    ) -> Self {
        Self {
            state: ServerState {
                registration,
                metrics,
                ready,
            },
            bind_address,
        }
    }

    /// Build the router without binding a socket.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/register", post(register::<W, R>))
            .route("/live", get(liveness))
            .route("/ready", get(readiness::<W, R>))
            .route("/metrics", get(metrics::<W, R>))
            .with_state(self.state.clone())
    }

    /// Serve until the shutdown signal fires.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!(address = %self.bind_address, "API server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}

/// HTTP status for a registration failure.
pub fn status_for(err: &SagaError) -> StatusCode {
    match err {
        SagaError::Validation(_) => StatusCode::BAD_REQUEST,
        SagaError::UserAlreadyExists(_) => StatusCode::CONFLICT,
        SagaError::External { .. } => StatusCode::BAD_GATEWAY,
        SagaError::UserNotFound(_)
        | SagaError::Serialization(_)
        | SagaError::VersionConflict { .. }
        | SagaError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn register<W: CustodyWalletService, R: UserRepository>(
    State(state): State<ServerState<W, R>>,
    Json(request): Json<RegistrationRequest>,
) -> Response {
    if !*state.ready.borrow() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "shutting down" })),
        )
            .into_response();
    }

    match state.registration.register(request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                warn!(error = %e, kind = e.kind(), "Registration failed");
            }
            (
                status,
                Json(json!({ "error": e.to_string(), "kind": e.kind() })),
            )
                .into_response()
        }
    }
}

/// Liveness probe: always returns 200 if the process is running.
async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness probe: 503 during graceful shutdown.
async fn readiness<W: CustodyWalletService, R: UserRepository>(
    State(state): State<ServerState<W, R>>,
) -> impl IntoResponse {
    if *state.ready.borrow() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics<W: CustodyWalletService, R: UserRepository>(
    State(state): State<ServerState<W, R>>,
) -> Response {
    match state.metrics.encode() {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => {
            warn!(error = %e, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
