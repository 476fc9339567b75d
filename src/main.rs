//! Market Onboarding Service - Entry Point
//!
//! Loads configuration, wires the saga, and serves registrations until
//! SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate, load secrets from env
//! 2. Init tracing (JSON structured logging)
//! 3. Open the user repository (JSON files or memory)
//! 4. Build one HttpClient per collaborator and the port adapters
//! 5. Build WorkerPool + EventBus, construct stages B-E, subscribe them
//! 6. Spawn the saga supervisor and the API server
//! 7. Wait for SIGINT -> graceful shutdown (refuse -> drain -> exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use market_onboarding::adapters::api::{
    AdminCredentials, HttpClient, HttpClientConfig, HttpCredentialService,
    HttpDepositAddressService, HttpLedgerService, HttpObjectStorage, HttpWalletService,
    QrServiceRenderer,
};
use market_onboarding::adapters::http::ApiServer;
use market_onboarding::adapters::metrics::SagaMetrics;
use market_onboarding::adapters::persistence::{InMemoryUserRepository, JsonUserStore};
use market_onboarding::config::secrets::Secrets;
use market_onboarding::config::{self, AppConfig, PersistenceBackend, ServiceEndpoint};
use market_onboarding::domain::events::{
    AssetsGenerationTriggered, DepositAddressProvisioned, LedgerProvisioned, WalletProvisioned,
};
use market_onboarding::ports::events::EventPublisher;
use market_onboarding::ports::metrics::MetricsSink;
use market_onboarding::ports::user_repository::UserRepository;
use market_onboarding::usecases::{
    AssetGeneration, CredentialProvisioning, DepositAddressProvisioning, EventBus, EventHandler,
    LedgerProvisioning, SagaSupervisor, WalletProvisioning, WorkerPool,
};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration and secrets ───────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.service.log_level)),
        )
        .json()
        .init();

    let secrets = Secrets::from_env().context("Failed to load collaborator secrets from env")?;

    info!(
        name = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.persistence.backend,
        max_concurrent_tasks = config.saga.max_concurrent_tasks,
        "Starting onboarding service"
    );

    // ── 3. Open the user repository ─────────────────────────
    match config.persistence.backend {
        PersistenceBackend::Json => {
            let store = JsonUserStore::open(&config.persistence.data_dir)
                .await
                .context("Failed to open user store")?;
            anyhow::ensure!(
                store.is_healthy().await,
                "User store directory {} is not accessible",
                config.persistence.data_dir
            );
            run(config, secrets, Arc::new(store)).await
        }
        PersistenceBackend::Memory => {
            warn!("In-memory user repository: rows are lost on exit");
            run(config, secrets, Arc::new(InMemoryUserRepository::new())).await
        }
    }
}

/// Wire the saga around `users` and serve until SIGINT.
async fn run<R: UserRepository>(config: AppConfig, secrets: Secrets, users: Arc<R>) -> Result<()> {
    let saga = &config.saga;

    // ── Shutdown signal channels ────────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let (ready_tx, ready_rx) = watch::channel(true);

    // ── 4. Collaborator adapters ────────────────────────────
    let wallets = Arc::new(HttpWalletService::new(
        client_for("wallet_service", &config.wallet_service.endpoint)?,
        secrets.wallet_api_key.clone(),
    ));
    let deposits = Arc::new(HttpDepositAddressService::new(
        client_for("deposit_address", &config.deposit_address.endpoint)?,
        secrets.deposit_address_api_key.clone(),
        config.deposit_address.destination_chain_id,
    ));
    let ledger = Arc::new(HttpLedgerService::new(
        client_for("ledger", &config.ledger.endpoint)?,
        config.ledger.ledger_id.clone(),
        secrets.ledger_api_key.clone(),
    ));
    let credentials = Arc::new(HttpCredentialService::new(
        client_for("credential", &config.credential.endpoint)?,
        config.credential.realm.clone(),
        AdminCredentials {
            client_id: config.credential.admin_client_id.clone(),
            username: secrets.credential_admin_username.clone(),
            password: secrets.credential_admin_password.clone(),
        },
    ));
    let storage = Arc::new(HttpObjectStorage::new(
        client_for("storage", &config.storage.endpoint)?,
        config.storage.bucket.clone(),
        &config.storage.public_base_url,
        secrets.storage_access_token.clone(),
    ));
    let renderer = Arc::new(QrServiceRenderer::new(
        client_for("renderer", &config.renderer.endpoint)?,
        config.renderer.qr_path.clone(),
        config.renderer.qr_size,
        config.renderer.avatar_size,
    ));

    // ── 5. Worker pool, event bus, stages ───────────────────
    let metrics = Arc::new(SagaMetrics::new().context("Failed to register metrics")?);
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    let pool = Arc::new(WorkerPool::new(saga.max_concurrent_tasks, Arc::clone(&sink)));
    let bus = Arc::new(EventBus::new(Arc::clone(&pool), sink));
    let publisher: Arc<dyn EventPublisher> = bus.clone();

    let assets: Arc<dyn EventHandler<AssetsGenerationTriggered>> = Arc::new(AssetGeneration::new(
        renderer,
        storage,
        Arc::clone(&users),
        saga.save_retry_attempts,
    ));
    let deposit_stage: Arc<dyn EventHandler<WalletProvisioned>> =
        Arc::new(DepositAddressProvisioning::new(
            deposits,
            Arc::clone(&users),
            Arc::clone(&publisher),
            Arc::clone(&pool),
            assets,
            saga.destination_token_address.clone(),
            saga.save_retry_attempts,
        ));
    let ledger_stage: Arc<dyn EventHandler<DepositAddressProvisioned>> =
        Arc::new(LedgerProvisioning::new(
            ledger,
            Arc::clone(&users),
            Arc::clone(&publisher),
            saga.ledger_currency.clone(),
            saga.save_retry_attempts,
        ));
    let credential_stage: Arc<dyn EventHandler<LedgerProvisioned>> = Arc::new(
        CredentialProvisioning::new(credentials, Arc::clone(&users), saga.save_retry_attempts),
    );

    bus.subscribe(deposit_stage);
    bus.subscribe(ledger_stage);
    bus.subscribe(credential_stage);

    let registration = Arc::new(WalletProvisioning::new(
        wallets,
        Arc::clone(&users),
        Arc::clone(&publisher),
        saga.save_retry_attempts,
    ));

    // ── 6. Supervisor and API server ────────────────────────
    let supervisor = Arc::new(SagaSupervisor::new(
        Arc::clone(&users),
        Arc::clone(&publisher),
        Duration::from_secs(saga.supervisor_interval_secs),
        Duration::from_secs(saga.stall_after_secs),
        saga.supervisor_batch_size,
    ));
    let supervisor_handle = tokio::spawn(supervisor.run(shutdown_tx.subscribe()));

    let server = ApiServer::new(
        registration,
        metrics,
        ready_rx,
        config.server.bind_address.clone(),
    );
    let server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!(error = %e, "API server failed");
        }
    });

    info!(address = %config.server.bind_address, "Onboarding service is running");

    // ── 7. Wait for SIGINT ──────────────────────────────────
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    // 1. Readiness probe -> 503, registrations refused
    let _ = ready_tx.send(false);

    // 2. Drain in-flight stage tasks
    let drain_timeout = Duration::from_secs(saga.shutdown_drain_timeout_secs);
    info!(in_flight = pool.in_flight(), "Draining stage tasks...");
    if pool.drain(drain_timeout).await {
        info!("Stage tasks drained");
    } else {
        warn!(
            in_flight = pool.in_flight(),
            timeout_secs = drain_timeout.as_secs(),
            "Drain timed out, abandoning remaining stage tasks"
        );
    }

    // 3. Stop supervisor and server
    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), supervisor_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), server_handle).await;

    info!("Shutdown complete");
    Ok(())
}

fn client_for(name: &str, endpoint: &ServiceEndpoint) -> Result<Arc<HttpClient>> {
    let client = HttpClient::new(HttpClientConfig::from(endpoint))
        .with_context(|| format!("Failed to create {name} client"))?;
    Ok(Arc::new(client))
}
