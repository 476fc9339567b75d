//! Domain layer - Onboarding model and rules.
//!
//! Pure types for the provisioning saga: the user aggregate and its
//! stage state machine, the stage events, deposit-bundle parsing and the
//! small normalization/masking rules. No I/O happens here.

pub mod deposit_bundle;
pub mod error;
pub mod events;
pub mod masking;
pub mod user;
pub mod username;

pub use deposit_bundle::DepositAddresses;
pub use error::SagaError;
pub use events::{
    AssetsGenerationTriggered, DepositAddressProvisioned, LedgerProvisioned, SagaEvent,
    WalletProvisioned,
};
pub use user::{
    normalize_signer_address, DepositAddressStatus, ProvisioningStage, User, UserAssets,
};
pub use username::normalize_username;
