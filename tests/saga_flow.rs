//! Integration Tests - End-to-end Onboarding Saga
//!
//! Drives the real worker pool, event bus and stages against mockall
//! mocks of the collaborator ports and the in-memory user repository.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use mockall::mock;
use rust_decimal::Decimal;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use market_onboarding::adapters::persistence::InMemoryUserRepository;
use market_onboarding::domain::events::{
    AssetsGenerationTriggered, DepositAddressProvisioned, LedgerProvisioned, SagaEvent,
    WalletProvisioned,
};
use market_onboarding::domain::{DepositAddressStatus, ProvisioningStage, SagaError, User};
use market_onboarding::ports::deposit_address::{DepositAddressBundle, DepositAddressRequest};
use market_onboarding::ports::ledger::{IdentityRequest, LedgerBalance};
use market_onboarding::ports::renderer::RenderedImage;
use market_onboarding::ports::wallet::WalletRequest;
use market_onboarding::ports::{EventPublisher, NoopMetrics, UserRepository};
use market_onboarding::usecases::{
    AssetGeneration, CredentialProvisioning, DepositAddressProvisioning, EventBus, EventHandler,
    LedgerProvisioning, RegistrationRequest, SagaSupervisor, WalletProvisioning, WorkerPool,
};

// ---- Mock Definitions ----

mock! {
    pub Wallets {}

    #[async_trait::async_trait]
    impl market_onboarding::ports::wallet::CustodyWalletService for Wallets {
        async fn provision_wallet(&self, request: &WalletRequest) -> Result<String, SagaError>;
    }
}

mock! {
    pub Deposits {}

    #[async_trait::async_trait]
    impl market_onboarding::ports::deposit_address::DepositAddressService for Deposits {
        async fn create_deposit_address(
            &self,
            request: &DepositAddressRequest,
        ) -> Result<DepositAddressBundle, SagaError>;
    }
}

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl market_onboarding::ports::ledger::LedgerService for Ledger {
        async fn create_identity(&self, request: &IdentityRequest) -> Result<String, SagaError>;
        async fn create_balance(&self, identity_id: &str, currency: &str) -> Result<String, SagaError>;
        async fn balances_by_identity(&self, identity_id: &str) -> Result<Vec<LedgerBalance>, SagaError>;
    }
}

mock! {
    pub Credentials {}

    #[async_trait::async_trait]
    impl market_onboarding::ports::credential::CredentialService for Credentials {
        async fn create_user_if_absent(&self, username: &str, email: &str) -> Result<(), SagaError>;
        async fn set_password(&self, username: &str, password: &str) -> Result<(), SagaError>;
    }
}

mock! {
    pub Renderer {}

    #[async_trait::async_trait]
    impl market_onboarding::ports::renderer::AssetRenderer for Renderer {
        async fn render_avatar(&self, seed: &str) -> Result<RenderedImage, SagaError>;
        async fn render_qr(&self, content: &str) -> Result<RenderedImage, SagaError>;
    }
}

mock! {
    pub Storage {}

    #[async_trait::async_trait]
    impl market_onboarding::ports::storage::ObjectStorage for Storage {
        async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, SagaError>;
    }
}

// ---- Helpers ----

const TOKEN: &str = "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913";
const SAVE_ATTEMPTS: u32 = 8;

/// Publisher that only records.
#[derive(Default)]
struct Recorder(Mutex<Vec<SagaEvent>>);

impl Recorder {
    fn ledger_events(&self) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, SagaEvent::LedgerProvisioned(_)))
            .count()
    }
}

impl EventPublisher for Recorder {
    fn publish(&self, event: SagaEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Real pool and bus around the in-memory repository.
struct Harness {
    users: Arc<InMemoryUserRepository>,
    pool: Arc<WorkerPool>,
    bus: Arc<EventBus>,
}

impl Harness {
    fn new() -> Self {
        let pool = Arc::new(WorkerPool::new(8, Arc::new(NoopMetrics)));
        let bus = Arc::new(EventBus::new(Arc::clone(&pool), Arc::new(NoopMetrics)));
        Self {
            users: Arc::new(InMemoryUserRepository::new()),
            pool,
            bus,
        }
    }

    fn publisher(&self) -> Arc<dyn EventPublisher> {
        self.bus.clone()
    }

    /// Subscribe the deposit-address, ledger and credential stages;
    /// assets hang off the deposit-address stage.
    fn wire(
        &self,
        deposits: MockDeposits,
        ledger: MockLedger,
        credentials: MockCredentials,
        renderer: MockRenderer,
        storage: MockStorage,
    ) {
        let assets: Arc<dyn EventHandler<AssetsGenerationTriggered>> = Arc::new(AssetGeneration::new(
            Arc::new(renderer),
            Arc::new(storage),
            Arc::clone(&self.users),
            SAVE_ATTEMPTS,
        ));
        self.bus.subscribe(Arc::new(DepositAddressProvisioning::new(
            Arc::new(deposits),
            Arc::clone(&self.users),
            self.publisher(),
            Arc::clone(&self.pool),
            assets,
            TOKEN,
            SAVE_ATTEMPTS,
        )) as Arc<dyn EventHandler<WalletProvisioned>>);
        self.bus.subscribe(Arc::new(LedgerProvisioning::new(
            Arc::new(ledger),
            Arc::clone(&self.users),
            self.publisher(),
            "USDC",
            SAVE_ATTEMPTS,
        )) as Arc<dyn EventHandler<DepositAddressProvisioned>>);
        self.bus.subscribe(Arc::new(CredentialProvisioning::new(
            Arc::new(credentials),
            Arc::clone(&self.users),
            SAVE_ATTEMPTS,
        )) as Arc<dyn EventHandler<LedgerProvisioned>>);
    }

    async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.pool.wait_idle())
            .await
            .expect("saga did not settle");
    }

    async fn row(&self, id: Uuid) -> User {
        self.users.find_by_id(id).await.unwrap().expect("user row")
    }
}

fn bundle() -> DepositAddressBundle {
    DepositAddressBundle {
        deposit_address: "0x00000000000000000000000000000000000000da".to_string(),
        raw: json!({
            "8453": {"address": "0x0000000000000000000000000000000000000ba5"},
            "solana": {"address": "So1anaDepositAddress111111111111111111111111"}
        })
        .as_object()
        .cloned()
        .unwrap(),
    }
}

fn png() -> RenderedImage {
    RenderedImage {
        bytes: vec![0x89, b'P', b'N', b'G'],
        content_type: "image/png",
        extension: "png",
    }
}

fn working_renderer() -> MockRenderer {
    let mut renderer = MockRenderer::new();
    renderer.expect_render_avatar().returning(|_| {
        Ok(RenderedImage {
            bytes: b"<svg/>".to_vec(),
            content_type: "image/svg+xml",
            extension: "svg",
        })
    });
    renderer.expect_render_qr().returning(|_| Ok(png()));
    renderer
}

fn working_storage() -> MockStorage {
    let mut storage = MockStorage::new();
    storage
        .expect_upload()
        .returning(|key, _, _| Ok(format!("https://cdn.test/{key}")));
    storage
}

/// Credential mock that records every username it is asked to create.
fn counting_credentials(seen: Arc<Mutex<Vec<String>>>) -> MockCredentials {
    let mut credentials = MockCredentials::new();
    credentials
        .expect_create_user_if_absent()
        .returning(move |username, _| {
            seen.lock().unwrap().push(username.to_string());
            Ok(())
        });
    credentials.expect_set_password().returning(|_, _| Ok(()));
    credentials
}

async fn user_at_deposit_stage(users: &InMemoryUserRepository) -> User {
    let mut user = User::new("carol@example.com", "did:ethr:Carol=", "0xabc");
    user.custody_wallet_address = Some("0x00000000000000000000000000000000000000c5".into());
    user.deposit_address = Some("0x00000000000000000000000000000000000000da".into());
    user.deposit_address_status = DepositAddressStatus::Active;
    user.current_stage = ProvisioningStage::DepositAddressProvisioned;
    users.insert(&user).await.unwrap()
}

fn deposit_event(user: &User) -> DepositAddressProvisioned {
    DepositAddressProvisioned {
        user_id: user.id,
        email: user.email.clone(),
        custody_wallet_address: user.custody_wallet_address.clone().unwrap_or_default(),
        deposit_address: user.deposit_address.clone().unwrap_or_default(),
        external_auth_issuer: user.external_auth_issuer.clone(),
        external_auth_token: "tok".into(),
        timestamp: Utc::now(),
    }
}

fn ledger_event(issuer: &str) -> LedgerProvisioned {
    LedgerProvisioned {
        user_id: Uuid::new_v4(),
        custody_wallet_address: "0xc5".into(),
        deposit_address: "0xda".into(),
        ledger_identity_id: "idn_1".into(),
        ledger_balance_id: "bln_1".into(),
        email: "dave@example.com".into(),
        external_auth_issuer: issuer.into(),
        external_auth_token: "initial-password".into(),
        timestamp: Utc::now(),
    }
}

// ---- Full saga ----

#[tokio::test]
async fn test_fresh_registration_provisions_every_field_group() {
    let harness = Harness::new();

    let mut deposits = MockDeposits::new();
    deposits
        .expect_create_deposit_address()
        .withf(|req| req.destination_token_address == TOKEN)
        .times(1)
        .returning(|_| Ok(bundle()));

    let mut ledger = MockLedger::new();
    ledger
        .expect_create_identity()
        .times(1)
        .returning(|_| Ok("idn_1".to_string()));
    ledger
        .expect_create_balance()
        .times(1)
        .returning(|_, _| Ok("bln_1".to_string()));

    let usernames = Arc::new(Mutex::new(Vec::new()));
    harness.wire(
        deposits,
        ledger,
        counting_credentials(Arc::clone(&usernames)),
        working_renderer(),
        working_storage(),
    );

    let mut wallets = MockWallets::new();
    wallets
        .expect_provision_wallet()
        .times(1)
        .returning(|_| Ok("0x00000000000000000000000000000000000000c5".to_string()));
    let registration = WalletProvisioning::new(
        Arc::new(wallets),
        Arc::clone(&harness.users),
        harness.publisher(),
        SAVE_ATTEMPTS,
    );

    let response = assert_ok!(
        registration
            .register(RegistrationRequest {
                email: "alice@example.com".into(),
                external_auth_issuer: "MagicUser123=".into(),
                external_auth_token: "tok".into(),
                signer_address: "0x1111111111111111111111111111111111111111".into(),
                username: None,
            })
            .await
    );
    assert_eq!(response.current_stage, ProvisioningStage::WalletProvisioned);

    harness.settle().await;
    let row = harness.row(response.user_id).await;

    assert!(row.custody_wallet_address.is_some());
    assert_eq!(row.deposit_address_status, DepositAddressStatus::Active);
    assert!(row.raw_deposit_address_bundle.is_some());
    assert_eq!(row.ledger_identity_id.as_deref(), Some("idn_1"));
    assert_eq!(row.ledger_balance_id.as_deref(), Some("bln_1"));
    assert!(row.credential_provisioned_at.is_some());
    assert_eq!(row.current_stage, ProvisioningStage::CredentialProvisioned);
    assert_eq!(row.last_error, None);

    let assets = &row.assets;
    assert!(assets.custody_wallet_qr_url.as_deref().unwrap().ends_with("proxy_wallet.png"));
    assert!(assets.deposit_address_qr_url.as_deref().unwrap().ends_with("enclave_uda.png"));
    assert!(assets.evm_deposit_qr_urls.contains_key("base"));
    assert!(assets.solana_deposit_qr_url.is_some());
    assert!(assets.avatar_url.is_some());

    assert_eq!(*usernames.lock().unwrap(), vec!["magicuser123".to_string()]);
}

#[tokio::test]
async fn test_registration_response_ignores_later_failures() {
    let harness = Harness::new();

    let mut deposits = MockDeposits::new();
    deposits
        .expect_create_deposit_address()
        .returning(|_| Err(SagaError::external("deposit_address", "HTTP 503")));
    let usernames = Arc::new(Mutex::new(Vec::new()));
    harness.wire(
        deposits,
        MockLedger::new(),
        counting_credentials(Arc::clone(&usernames)),
        MockRenderer::new(),
        MockStorage::new(),
    );

    let mut wallets = MockWallets::new();
    wallets
        .expect_provision_wallet()
        .returning(|_| Ok("0x00000000000000000000000000000000000000c5".to_string()));
    let registration = WalletProvisioning::new(
        Arc::new(wallets),
        Arc::clone(&harness.users),
        harness.publisher(),
        SAVE_ATTEMPTS,
    );

    let response = assert_ok!(
        registration
            .register(RegistrationRequest {
                email: "bob@example.com".into(),
                external_auth_issuer: "Bob".into(),
                external_auth_token: "tok".into(),
                signer_address: "0x2222222222222222222222222222222222222222".into(),
                username: None,
            })
            .await
    );

    harness.settle().await;
    let row = harness.row(response.user_id).await;
    assert_eq!(row.current_stage, ProvisioningStage::WalletProvisioned);
    assert!(row.deposit_address.is_none());
    assert!(row.assets.is_empty());
    assert!(row.last_error.unwrap().starts_with("deposit_address"));
    assert!(usernames.lock().unwrap().is_empty());
}

// ---- Ledger idempotency ----

#[tokio::test]
async fn test_redelivery_with_existing_balance_is_a_no_op() {
    let users = Arc::new(InMemoryUserRepository::new());
    let mut user = User::new("erin@example.com", "Erin", "0xabc");
    user.custody_wallet_address = Some("0xc5".into());
    user.deposit_address = Some("0xda".into());
    user.ledger_identity_id = Some("idn_9".into());
    user.ledger_balance_id = Some("bln_9".into());
    user.current_stage = ProvisioningStage::CredentialProvisioned;
    let user = users.insert(&user).await.unwrap();

    let mut ledger = MockLedger::new();
    ledger
        .expect_balances_by_identity()
        .withf(|identity| identity == "idn_9")
        .times(1)
        .returning(|_| {
            Ok(vec![LedgerBalance {
                balance_id: "bln_9".into(),
                currency: "USDC".into(),
                amount: Decimal::ZERO,
            }])
        });

    let recorder = Arc::new(Recorder::default());
    let stage = LedgerProvisioning::new(
        Arc::new(ledger),
        Arc::clone(&users),
        recorder.clone(),
        "USDC",
        SAVE_ATTEMPTS,
    );

    assert_ok!(stage.handle(deposit_event(&user)).await);
    assert_eq!(recorder.ledger_events(), 0);

    let row = users.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(row.ledger_balance_id.as_deref(), Some("bln_9"));
    assert_eq!(row.version, user.version);
}

#[tokio::test]
async fn test_identity_without_balance_creates_only_the_balance() {
    let users = Arc::new(InMemoryUserRepository::new());
    let mut user = user_at_deposit_stage(&users).await;
    user.ledger_identity_id = Some("idn_7".into());
    let user = users.save(&user).await.unwrap();

    let mut ledger = MockLedger::new();
    ledger
        .expect_balances_by_identity()
        .times(1)
        .returning(|_| {
            Ok(vec![LedgerBalance {
                balance_id: "bln_eur".into(),
                currency: "EUR".into(),
                amount: Decimal::new(500, 2),
            }])
        });
    ledger
        .expect_create_balance()
        .withf(|identity, currency| identity == "idn_7" && currency == "USDC")
        .times(1)
        .returning(|_, _| Ok("bln_new".to_string()));

    let recorder = Arc::new(Recorder::default());
    let stage = LedgerProvisioning::new(
        Arc::new(ledger),
        Arc::clone(&users),
        recorder.clone(),
        "USDC",
        SAVE_ATTEMPTS,
    );

    assert_ok!(stage.handle(deposit_event(&user)).await);
    assert_eq!(recorder.ledger_events(), 1);

    let row = users.find_by_id(user.id).await.unwrap().unwrap();
    assert_eq!(row.ledger_identity_id.as_deref(), Some("idn_7"));
    assert_eq!(row.ledger_balance_id.as_deref(), Some("bln_new"));
    assert_eq!(row.current_stage, ProvisioningStage::LedgerProvisioned);
}

#[tokio::test]
async fn test_missing_user_makes_no_ledger_call() {
    let users = Arc::new(InMemoryUserRepository::new());
    // No expectations: any ledger call panics on this thread.
    let stage = LedgerProvisioning::new(
        Arc::new(MockLedger::new()),
        users,
        Arc::new(Recorder::default()),
        "USDC",
        SAVE_ATTEMPTS,
    );

    let ghost = User::new("ghost@example.com", "Ghost", "0xabc");
    let err = assert_err!(stage.handle(deposit_event(&ghost)).await);
    assert_eq!(err, SagaError::UserNotFound(ghost.id));
}

#[tokio::test]
async fn test_identity_failure_never_reaches_credentials() {
    let harness = Harness::new();
    let user = user_at_deposit_stage(&harness.users).await;

    let mut ledger = MockLedger::new();
    ledger
        .expect_create_identity()
        .times(1)
        .returning(|_| Err(SagaError::external("ledger", "HTTP 500: boom")));

    let usernames = Arc::new(Mutex::new(Vec::new()));
    harness.wire(
        MockDeposits::new(),
        ledger,
        counting_credentials(Arc::clone(&usernames)),
        MockRenderer::new(),
        MockStorage::new(),
    );

    harness.bus.publish(deposit_event(&user).into());
    harness.settle().await;

    assert!(usernames.lock().unwrap().is_empty());
    let row = harness.row(user.id).await;
    assert_eq!(row.current_stage, ProvisioningStage::DepositAddressProvisioned);
    assert!(row.ledger_identity_id.is_none());
    assert!(row.last_error.unwrap().starts_with("ledger"));
}

/// Ledger double that remembers what it created.
#[derive(Default)]
struct FakeLedger {
    identities: AtomicUsize,
    balances: Mutex<HashMap<String, Vec<LedgerBalance>>>,
}

#[async_trait::async_trait]
impl market_onboarding::ports::ledger::LedgerService for FakeLedger {
    async fn create_identity(&self, _request: &IdentityRequest) -> Result<String, SagaError> {
        let n = self.identities.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("idn_{n}"))
    }

    async fn create_balance(&self, identity_id: &str, currency: &str) -> Result<String, SagaError> {
        let mut balances = self.balances.lock().unwrap();
        let owned = balances.entry(identity_id.to_string()).or_default();
        let balance_id = format!("bln_{identity_id}_{}", owned.len() + 1);
        owned.push(LedgerBalance {
            balance_id: balance_id.clone(),
            currency: currency.to_string(),
            amount: Decimal::ZERO,
        });
        Ok(balance_id)
    }

    async fn balances_by_identity(&self, identity_id: &str) -> Result<Vec<LedgerBalance>, SagaError> {
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(identity_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[tokio::test]
async fn test_ledger_stage_twice_leaves_one_identity_and_one_balance() {
    let users = Arc::new(InMemoryUserRepository::new());
    let user = user_at_deposit_stage(&users).await;
    let ledger = Arc::new(FakeLedger::default());
    let recorder = Arc::new(Recorder::default());
    let stage = LedgerProvisioning::new(
        Arc::clone(&ledger),
        Arc::clone(&users),
        recorder.clone(),
        "USDC",
        SAVE_ATTEMPTS,
    );

    assert_ok!(stage.handle(deposit_event(&user)).await);
    assert_ok!(stage.handle(deposit_event(&user)).await);

    assert_eq!(ledger.identities.load(Ordering::SeqCst), 1);
    let balances = ledger.balances.lock().unwrap();
    assert_eq!(balances.values().map(Vec::len).sum::<usize>(), 1);
    assert_eq!(recorder.ledger_events(), 1);
}

// ---- Credentials ----

#[tokio::test]
async fn test_credential_username_is_normalized() {
    for (raw, expected) in [
        ("MagicUser123=", "magicuser123"),
        ("UPPERCASE_USER_ID=====", "uppercase_user_id"),
    ] {
        let usernames = Arc::new(Mutex::new(Vec::new()));
        let stage = CredentialProvisioning::new(
            Arc::new(counting_credentials(Arc::clone(&usernames))),
            Arc::new(InMemoryUserRepository::new()),
            SAVE_ATTEMPTS,
        );

        // The row is absent: stamping is best effort and does not fail the stage.
        assert_ok!(stage.handle(ledger_event(raw)).await);
        assert_eq!(*usernames.lock().unwrap(), vec![expected.to_string()]);
    }
}

#[tokio::test]
async fn test_existing_credential_account_still_gets_its_password() {
    let mut credentials = MockCredentials::new();
    credentials
        .expect_create_user_if_absent()
        .times(1)
        .returning(|username, _| Err(SagaError::UserAlreadyExists(username.to_string())));
    credentials
        .expect_set_password()
        .withf(|username, password| username == "dave" && password == "initial-password")
        .times(1)
        .returning(|_, _| Ok(()));

    let stage = CredentialProvisioning::new(
        Arc::new(credentials),
        Arc::new(InMemoryUserRepository::new()),
        SAVE_ATTEMPTS,
    );
    assert_ok!(stage.handle(ledger_event("Dave")).await);
}

// ---- Supervisor ----

#[tokio::test]
async fn test_supervisor_resumes_a_stalled_user_up_to_credentials() {
    let harness = Harness::new();

    let mut user = User::new("frank@example.com", "Frank", "0xabc");
    user.custody_wallet_address = Some("0x00000000000000000000000000000000000000c5".into());
    user.current_stage = ProvisioningStage::WalletProvisioned;
    let user = harness.users.insert(&user).await.unwrap();

    let mut deposits = MockDeposits::new();
    deposits
        .expect_create_deposit_address()
        .times(1)
        .returning(|_| Ok(bundle()));
    let mut ledger = MockLedger::new();
    ledger
        .expect_create_identity()
        .returning(|_| Ok("idn_1".to_string()));
    ledger
        .expect_create_balance()
        .returning(|_, _| Ok("bln_1".to_string()));

    let usernames = Arc::new(Mutex::new(Vec::new()));
    harness.wire(
        deposits,
        ledger,
        counting_credentials(Arc::clone(&usernames)),
        working_renderer(),
        working_storage(),
    );

    let supervisor = SagaSupervisor::new(
        Arc::clone(&harness.users),
        harness.publisher(),
        Duration::from_secs(60),
        Duration::ZERO,
        10,
    );
    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = assert_ok!(supervisor.sweep().await);
    assert_eq!(report.resumed, 1);

    harness.settle().await;
    let row = harness.row(user.id).await;
    assert_eq!(row.ledger_balance_id.as_deref(), Some("bln_1"));
    // The auth token is never stored, so the credential stage cannot run on resume.
    assert_eq!(row.current_stage, ProvisioningStage::LedgerProvisioned);
    assert!(row.last_error.unwrap().starts_with("credential"));
    assert!(usernames.lock().unwrap().is_empty());
}
