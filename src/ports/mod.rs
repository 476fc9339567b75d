//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Interfaces the saga needs from the outside world. Adapters implement
//! them; tests mock them.
//!
//! Port categories:
//! - `UserRepository`: user row persistence with compare-and-swap saves
//! - `CustodyWalletService`, `DepositAddressService`, `LedgerService`,
//!   `CredentialService`: the four provisioning collaborators
//! - `ObjectStorage`, `AssetRenderer`: asset generation
//! - `EventPublisher`, `MetricsSink`: fan-out and observability

pub mod credential;
pub mod deposit_address;
pub mod events;
pub mod ledger;
pub mod metrics;
pub mod renderer;
pub mod storage;
pub mod user_repository;
pub mod wallet;

pub use credential::CredentialService;
pub use deposit_address::{DepositAddressBundle, DepositAddressRequest, DepositAddressService};
pub use events::EventPublisher;
pub use ledger::{IdentityRequest, LedgerBalance, LedgerService};
pub use metrics::{MetricsSink, NoopMetrics};
pub use renderer::{AssetRenderer, RenderedImage};
pub use storage::ObjectStorage;
pub use user_repository::UserRepository;
pub use wallet::{CustodyWalletService, WalletRequest};
