use anyhow::{Context, Result};
use keyring::Entry;

use super::store::SessionStore;

const SERVICE_NAME: &str = "tokenkeep";

/// Session token kept in the OS keychain under `tokenkeep/<key>`.
pub struct KeyringSessionStore {
    key: String,
}

impl KeyringSessionStore {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.key).context("Failed to create keyring entry")
    }
}

impl SessionStore for KeyringSessionStore {
    /// Retrieve the token from the OS keychain
    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(token) if token.trim().is_empty() => Ok(None),
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    /// Store the token in the OS keychain
    fn save(&self, token: &str) -> Result<()> {
        self.entry()?
            .set_password(token)
            .context("Failed to store token in keychain")
    }

    /// Delete the stored token
    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
