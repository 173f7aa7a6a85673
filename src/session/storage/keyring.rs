//! System keyring settings storage (feature-gated).
//!
//! The whole settings map is kept as a single JSON secret, so batch writes
//! replace it in one call:
//! - macOS: Keychain
//! - Linux: Secret Service (GNOME Keyring, KWallet)
//! - Windows: Credential Manager

use async_trait::async_trait;
use keyring::Entry;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::instrument;

use super::SettingsStore;
use crate::session::error::{Error, Result};

const SERVICE_NAME: &str = "yeti-session";

static KEYRING_AVAILABLE: OnceLock<bool> = OnceLock::new();

type SettingsMap = BTreeMap<String, String>;

/// Keyring-backed [`SettingsStore`].
#[derive(Debug, Clone)]
pub struct KeyringSettingsStore {
    account: String,
}

impl Default for KeyringSettingsStore {
    fn default() -> Self {
        Self::with_account("settings")
    }
}

impl KeyringSettingsStore {
    pub fn with_account(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    /// Whether a keyring backend answers on this machine. Checked once per process.
    pub fn is_available() -> bool {
        *KEYRING_AVAILABLE.get_or_init(|| match Entry::new(SERVICE_NAME, "availability-check") {
            Ok(entry) => !matches!(
                entry.get_password(),
                Err(keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_))
            ),
            Err(_) => false,
        })
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &self.account)
            .map_err(|e| Error::storage(format!("Failed to create keyring entry: {e}")))
    }

    async fn read_map(&self) -> Result<SettingsMap> {
        let entry = self.entry()?;
        let result = tokio::task::spawn_blocking(move || entry.get_password())
            .await
            .map_err(|e| Error::storage(format!("Keyring task failed: {e}")))?;

        match result {
            Ok(secret) => serde_json::from_str(&secret)
                .map_err(|e| Error::storage(format!("Failed to parse keyring settings: {e}"))),
            Err(keyring::Error::NoEntry) => Ok(SettingsMap::new()),
            Err(e) => Err(Error::from(e)),
        }
    }

    async fn write_map(&self, map: SettingsMap) -> Result<()> {
        let entry = self.entry()?;
        if map.is_empty() {
            let result = tokio::task::spawn_blocking(move || entry.delete_password())
                .await
                .map_err(|e| Error::storage(format!("Keyring task failed: {e}")))?;
            return match result {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(Error::from(e)),
            };
        }

        let secret = serde_json::to_string(&map)?;
        tokio::task::spawn_blocking(move || entry.set_password(&secret))
            .await
            .map_err(|e| Error::storage(format!("Keyring task failed: {e}")))??;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for KeyringSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_map().await?.remove(key))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.read_map().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(map).await
    }

    #[instrument(skip(self))]
    async fn clear(&self, key: &str) -> Result<()> {
        let mut map = self.read_map().await?;
        if map.remove(key).is_some() {
            self.write_map(map).await?;
        }
        Ok(())
    }

    #[instrument(skip_all, fields(count = entries.len()))]
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut map = self.read_map().await?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        self.write_map(map).await
    }

    #[instrument(skip(self))]
    async fn clear_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.read_map().await?;
        let before = map.len();
        for key in keys {
            map.remove(*key);
        }
        if map.len() != before {
            self.write_map(map).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
