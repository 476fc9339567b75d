//! Provisioning Collaborator Adapters
//!
//! HTTP clients for every external service the saga talks to. All of
//! them share `HttpClient` for timeouts, retries and concurrency limits,
//! and turn failures into `SagaError::External` at the port boundary.
//!
//! Sub-modules:
//! - `client`: bounded, retrying reqwest wrapper
//! - `wallet`: custody wallet service
//! - `deposit_address`: unified deposit-address service
//! - `ledger`: double-entry ledger identities and balances
//! - `credential`: identity-provider admin API
//! - `storage`: public object storage
//! - `renderer`: QR codes and identicon avatars
//! - `types`: wire request/response types

pub mod client;
pub mod credential;
pub mod deposit_address;
pub mod ledger;
pub mod renderer;
pub mod storage;
pub mod types;
pub mod wallet;

pub use client::{HttpClient, HttpClientConfig};
pub use credential::{AdminCredentials, HttpCredentialService};
pub use deposit_address::HttpDepositAddressService;
pub use ledger::HttpLedgerService;
pub use renderer::QrServiceRenderer;
pub use storage::HttpObjectStorage;
pub use wallet::HttpWalletService;
