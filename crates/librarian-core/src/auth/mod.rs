//! Session token management.
//!
//! This module provides:
//! - `Session`: the single accessor for the bearer token (get/replace/clear)
//! - `TokenStore`: where the token is persisted, with file, OS keychain and
//!   in-memory backends
//!
//! At most one token is stored at a time; no token means signed out.

pub mod credentials;
pub mod session;
pub mod store;

pub use credentials::KeyringTokenStore;
pub use session::Session;
pub use store::{FileTokenStore, MemoryTokenStore, StoredToken, TokenStore};
