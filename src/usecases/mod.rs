//! Use Cases Layer - The Onboarding Saga
//!
//! Orchestrates the domain with the port interfaces. Registration runs
//! the wallet stage inline; every later stage is an `EventHandler`
//! driven by the `EventBus` on the `WorkerPool`.
//!
//! Use cases:
//! - `WalletProvisioning`: registration and custody wallet
//! - `DepositAddressProvisioning`: deposit-address bundle
//! - `LedgerProvisioning`: ledger identity and balance
//! - `CredentialProvisioning`: login credential (terminal)
//! - `AssetGeneration`: avatar and QR codes (parallel leaf)
//! - `SagaSupervisor`: resumption of stalled users

pub mod asset_generation;
pub mod credential_provisioning;
pub mod deposit_address_provisioning;
pub mod event_bus;
pub mod ledger_provisioning;
pub mod supervisor;
pub mod user_record;
pub mod wallet_provisioning;
pub mod worker_pool;

pub use asset_generation::AssetGeneration;
pub use credential_provisioning::CredentialProvisioning;
pub use deposit_address_provisioning::DepositAddressProvisioning;
pub use event_bus::{EventBus, EventHandler};
pub use ledger_provisioning::LedgerProvisioning;
pub use supervisor::{SagaSupervisor, SweepReport};
pub use wallet_provisioning::{RegistrationRequest, RegistrationResponse, WalletProvisioning};
pub use worker_pool::WorkerPool;
