//! Credential persistence using the OS keyring.

use keyring::Entry;
use nosh_core::credentials::{SecretStore, VaultError, VaultResult};

const KEYRING_SERVICE_NAME: &str = "nosh";

/// Secret store backed by the OS keyring (`keyring` crate).
#[derive(Debug, Clone, Default)]
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    fn entry(key: &str) -> VaultResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, key)
            .map_err(|error| VaultError::SecureStorage(error.to_string()))
    }
}

impl SecretStore for KeyringSecretStore {
    fn load(&self, key: &str) -> VaultResult<Option<String>> {
        let entry = Self::entry(key)?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(VaultError::SecureStorage(error.to_string())),
        }
    }

    fn save(&self, key: &str, value: &str) -> VaultResult<()> {
        Self::entry(key)?
            .set_password(value)
            .map_err(|error| VaultError::SecureStorage(error.to_string()))
    }

    fn delete(&self, key: &str) -> VaultResult<()> {
        let entry = Self::entry(key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(VaultError::SecureStorage(error.to_string())),
        }
    }
}
