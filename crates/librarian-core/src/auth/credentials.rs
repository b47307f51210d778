use anyhow::{Context, Result};
use keyring::Entry;

use super::store::{StoredToken, TokenStore};

const SERVICE_NAME: &str = "the-librarian";

/// Fixed key the session token is kept under
const TOKEN_KEY: &str = "accessToken";

/// Session token kept in the OS keychain.
pub struct KeyringTokenStore {
    entry: Entry,
}

impl KeyringTokenStore {
    pub fn new() -> Result<Self> {
        let entry = Entry::new(SERVICE_NAME, TOKEN_KEY).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Result<Option<StoredToken>> {
        match self.entry.get_password() {
            Ok(secret) => {
                let stored = serde_json::from_str(&secret)
                    .context("Failed to parse token stored in keychain")?;
                Ok(Some(stored))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        let secret = serde_json::to_string(token)?;
        self.entry
            .set_password(&secret)
            .context("Failed to store token in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
