//! Device identity and credential pair lifecycle.
//!
//! The vault is the single owner of everything in secure storage: the stable
//! per-installation device identity and the current access/refresh token
//! pair. All read-modify-write sequences go through one internal lock so a
//! first-access race cannot mint two device identities in-process.

pub mod claims;

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex as StdMutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub use claims::TokenExpiry;

const KEY_DEVICE_ID: &str = "device_id";
const KEY_TOKEN_PAIR: &str = "token_pair";

/// Access/refresh credential pair issued by the device exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
    #[error("Failed to parse stored credential payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type VaultResult<T> = Result<T, VaultError>;

/// Scoped secure key-value storage.
///
/// `save` overwrites any prior value; `delete` is idempotent. Implementations
/// live with the platform front ends (OS keyring on desktop); tests and
/// headless callers use [`MemorySecretStore`].
pub trait SecretStore: Send + Sync {
    fn load(&self, key: &str) -> VaultResult<Option<String>>;
    fn save(&self, key: &str, value: &str) -> VaultResult<()>;
    fn delete(&self, key: &str) -> VaultResult<()>;
}

/// Single owner of the device identity and token pair.
pub struct CredentialVault<S: SecretStore> {
    store: S,
    guard: Mutex<()>,
}

impl<S: SecretStore> CredentialVault<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            guard: Mutex::new(()),
        }
    }

    /// Stable per-installation identity, generated lazily on first access.
    ///
    /// The identity is persisted before it is returned, and it is never
    /// regenerated once written.
    pub async fn device_id(&self) -> VaultResult<String> {
        let _guard = self.guard.lock().await;
        if let Some(existing) = self.store.load(KEY_DEVICE_ID)? {
            return Ok(existing);
        }

        let generated = uuid::Uuid::new_v4().to_string();
        self.store.save(KEY_DEVICE_ID, &generated)?;
        tracing::info!("Generated new device identity");
        Ok(generated)
    }

    /// Currently stored credential pair, if any.
    pub async fn tokens(&self) -> VaultResult<Option<TokenPair>> {
        let _guard = self.guard.lock().await;
        let Some(raw) = self.store.load(KEY_TOKEN_PAIR)? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Replace the stored credential pair wholesale.
    pub async fn store_tokens(&self, pair: &TokenPair) -> VaultResult<()> {
        let _guard = self.guard.lock().await;
        let serialized = serde_json::to_string(pair)?;
        self.store.save(KEY_TOKEN_PAIR, &serialized)
    }

    /// Drop the credential pair (logout). The device identity survives.
    pub async fn clear_tokens(&self) -> VaultResult<()> {
        let _guard = self.guard.lock().await;
        self.store.delete(KEY_TOKEN_PAIR)
    }

    /// Full reset: credential pair and device identity both removed.
    pub async fn reset(&self) -> VaultResult<()> {
        let _guard = self.guard.lock().await;
        self.store.delete(KEY_TOKEN_PAIR)?;
        self.store.delete(KEY_DEVICE_ID)
    }
}

/// In-memory secret store for tests and headless use.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: StdMutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn load(&self, key: &str) -> VaultResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::SecureStorage("secret store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> VaultResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::SecureStorage("secret store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> VaultResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::SecureStorage("secret store lock poisoned".to_string()))?;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn device_id_is_generated_once_and_persisted() {
        let vault = CredentialVault::new(MemorySecretStore::new());

        let first = vault.device_id().await.unwrap();
        let second = vault.device_id().await.unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn token_pair_roundtrip_and_clear() {
        let vault = CredentialVault::new(MemorySecretStore::new());
        assert!(vault.tokens().await.unwrap().is_none());

        let pair = TokenPair {
            access_token: "a.b.c".to_string(),
            refresh_token: "refresh".to_string(),
        };
        vault.store_tokens(&pair).await.unwrap();
        assert_eq!(vault.tokens().await.unwrap(), Some(pair));

        vault.clear_tokens().await.unwrap();
        assert!(vault.tokens().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clearing_tokens_keeps_device_identity() {
        let vault = CredentialVault::new(MemorySecretStore::new());
        let device_id = vault.device_id().await.unwrap();

        vault
            .store_tokens(&TokenPair {
                access_token: "a.b.c".to_string(),
                refresh_token: "r".to_string(),
            })
            .await
            .unwrap();
        vault.clear_tokens().await.unwrap();

        assert_eq!(vault.device_id().await.unwrap(), device_id);
    }

    #[tokio::test]
    async fn reset_drops_identity_too() {
        let vault = CredentialVault::new(MemorySecretStore::new());
        let device_id = vault.device_id().await.unwrap();

        vault.reset().await.unwrap();
        assert_ne!(vault.device_id().await.unwrap(), device_id);
    }

    #[tokio::test]
    async fn concurrent_first_access_yields_one_identity() {
        let vault = std::sync::Arc::new(CredentialVault::new(MemorySecretStore::new()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let vault = vault.clone();
                tokio::spawn(async move { vault.device_id().await.unwrap() })
            })
            .collect();

        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[test]
    fn token_pair_debug_redacts_tokens() {
        let pair = TokenPair {
            access_token: "secret-access".to_string(),
            refresh_token: "secret-refresh".to_string(),
        };
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
