use std::sync::RwLock;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::config::{ClientConfig, TokenStorage};

use super::credentials::KeyringTokenStore;
use super::store::{FileTokenStore, MemoryTokenStore, StoredToken, TokenStore};

/// The only accessor for the bearer token.
///
/// The token is read from the store once, then kept in memory and written
/// through on every change. The in-memory copy is authoritative for the
/// process even when persisting fails.
pub struct Session {
    store: Box<dyn TokenStore>,
    current: RwLock<Option<StoredToken>>,
}

impl Session {
    /// Open a session over `store`. An unreadable store starts
    /// unauthenticated.
    pub fn open(store: Box<dyn TokenStore>) -> Self {
        let current = match store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Failed to load stored session, starting signed out");
                None
            }
        };
        debug!(authenticated = current.is_some(), "Session opened");
        Self {
            store,
            current: RwLock::new(current),
        }
    }

    /// Session that is never persisted
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryTokenStore::new()))
    }

    /// Open the session backend selected by the configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let store: Box<dyn TokenStore> = match config.token_storage {
            TokenStorage::File => Box::new(FileTokenStore::new(ClientConfig::data_dir()?)),
            TokenStorage::Keyring => Box::new(KeyringTokenStore::new()?),
            TokenStorage::Memory => Box::new(MemoryTokenStore::new()),
        };
        Ok(Self::open(store))
    }

    /// The bearer token, if signed in
    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        self.read().as_ref().map(|s| s.stored_at)
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    /// Replace the token wholesale.
    ///
    /// The write lock is held until the store call returns, so memory and
    /// store always change in the same order.
    pub fn replace(&self, token: &str) -> Result<()> {
        let stored = StoredToken::new(token);
        let mut current = self.write();
        *current = Some(stored.clone());
        self.store.save(&stored)
    }

    pub fn clear(&self) -> Result<()> {
        let mut current = self.write();
        *current = None;
        self.store.clear()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<StoredToken>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<StoredToken>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}
