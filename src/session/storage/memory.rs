//! In-memory settings storage.
//!
//! Clones share the same map, which makes it easy to hand one store to an
//! orchestrator and keep a handle for assertions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

use super::SettingsStore;
use crate::session::error::Result;

/// Thread-safe in-memory [`SettingsStore`].
#[derive(Debug, Clone, Default)]
pub struct MemorySettingsStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }

    /// Read a value without awaiting. Returns `None` while a writer holds the lock.
    pub fn get_sync(&self, key: &str) -> Option<String> {
        self.inner
            .try_read()
            .ok()
            .and_then(|guard| guard.get(key).cloned())
    }

    /// Write a value without awaiting. Returns `false` if the lock was busy.
    pub fn set_sync(&self, key: &str, value: &str) -> bool {
        match self.inner.try_write() {
            Ok(mut guard) => {
                guard.insert(key.to_string(), value.to_string());
                true
            }
            Err(_) => false,
        }
    }

    /// Copy of every entry.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.get(key).cloned())
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self, key: &str) -> Result<()> {
        self.inner.write().await.remove(key);
        Ok(())
    }

    #[instrument(skip_all, fields(count = entries.len()))]
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        let mut guard = self.inner.write().await;
        for (key, value) in entries {
            guard.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear_many(&self, keys: &[&str]) -> Result<()> {
        let mut guard = self.inner.write().await;
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
