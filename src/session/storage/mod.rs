//! Key-value settings storage for persisted session state.
//!
//! This module provides the [`SettingsStore`] trait and its implementations:
//!
//! - [`FileSettingsStore`] - JSON file with secure permissions and atomic writes
//! - [`MemorySettingsStore`] - In-memory storage for tests and embedding
//! - [`KeyringSettingsStore`] - System keyring (requires `keyring` feature)
//!
//! Stores offer plain get/set/clear with no transactions across processes.
//! Batch writes through [`SettingsStore::set_many`] and
//! [`SettingsStore::clear_many`] are applied in one write by stores that can,
//! so an entity spread over several keys is never seen half-written.
//!
//! Values are never logged; implementations use `#[instrument(skip(value))]`.

mod file;
mod memory;

#[cfg(feature = "keyring")]
mod keyring;

use async_trait::async_trait;

pub use file::FileSettingsStore;
pub use memory::MemorySettingsStore;

#[cfg(feature = "keyring")]
pub use self::keyring::KeyringSettingsStore;

use super::error::Result;

/// Persistent string settings keyed by name.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a value. Missing keys yield `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing a missing key is not an error.
    async fn clear(&self, key: &str) -> Result<()>;

    /// Write several values.
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    /// Remove several values.
    async fn clear_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.clear(key).await?;
        }
        Ok(())
    }

    /// Backend name for logs.
    fn name(&self) -> &str {
        "unknown"
    }
}

#[async_trait]
impl<T: SettingsStore + ?Sized> SettingsStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        (**self).set_many(entries).await
    }

    async fn clear_many(&self, keys: &[&str]) -> Result<()> {
        (**self).clear_many(keys).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[async_trait]
impl<T: SettingsStore + ?Sized> SettingsStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        (**self).clear(key).await
    }

    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        (**self).set_many(entries).await
    }

    async fn clear_many(&self, keys: &[&str]) -> Result<()> {
        (**self).clear_many(keys).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
