//! Persistence Adapters - User Row Storage
//!
//! Implements the `UserRepository` port twice: atomic per-user JSON
//! files for real runs and a plain in-memory map for tests. Both share
//! the same compare-and-swap rules through `UserTable`.

pub mod json_store;
pub mod memory;

pub use json_store::JsonUserStore;
pub use memory::{InMemoryUserRepository, UserTable};
