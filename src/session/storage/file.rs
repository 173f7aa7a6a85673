//! File-based settings storage with secure permissions.
//!
//! Settings live in a flat JSON object at a configurable path:
//! - File permissions set to 0600 on Unix (owner read/write only)
//! - Parent directories created with 0700 permissions
//! - Automatic `~` expansion to home directory
//! - Atomic writes via a uniquely named temp file + rename

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::SettingsStore;
use crate::session::error::{Error, Result};

/// Application directory under the platform data dir.
const APP_DIR: &str = "yeti-session";

/// Default settings file name.
const SETTINGS_FILE: &str = "settings.json";

#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

type SettingsMap = BTreeMap<String, String>;

/// JSON-file [`SettingsStore`].
///
/// # File Format
///
/// ```json
/// {
///   "devicekey": "7KQ2M9XW1B4ZP0AD",
///   "kstoken": "djJ8MzIwNH...",
///   "ksexpiry": "1767225600"
/// }
/// ```
///
/// Every write rewrites the whole file, so [`SettingsStore::set_many`] is a
/// single atomic replacement. Writes from separate processes are
/// last-writer-wins.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    /// Create a store at `path`. `~` is expanded to the home directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = expand_tilde(path.as_ref())?;
        Ok(Self { path })
    }

    /// Default location: `<data_dir>/yeti-session/settings.json`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR).join(SETTINGS_FILE))
            .ok_or_else(|| Error::config("Cannot determine data directory"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<SettingsMap> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SettingsMap::new()),
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to read settings file '{}': {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if content.trim().is_empty() {
            return Ok(SettingsMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            Error::storage(format!(
                "Failed to parse settings file '{}': {}",
                self.path.display(),
                e
            ))
        })
    }

    #[instrument(skip_all, fields(path = %self.path.display(), entries = map.len()))]
    async fn write_file(&self, map: &SettingsMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    Error::storage(format!(
                        "Failed to create directory '{}': {}",
                        parent.display(),
                        e
                    ))
                })?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(DIR_MODE);
                    tokio::fs::set_permissions(parent, perms).await.map_err(|e| {
                        Error::storage(format!(
                            "Failed to set directory permissions on '{}': {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
            }
        }

        let content = serde_json::to_string_pretty(map)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || replace_file(&dir, &path, content.as_bytes()))
            .await
            .map_err(|e| Error::storage(format!("Settings writer failed: {e}")))??;

        debug!("settings written");
        Ok(())
    }

    /// Apply `edit` to the stored map and write it back if anything changed.
    async fn update<F>(&self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut SettingsMap) -> bool + Send,
    {
        let mut map = self.read_file().await?;
        if edit(&mut map) {
            self.write_file(&map).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_file().await?.remove(key))
    }

    #[instrument(skip(self, value))]
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string()).as_deref() != Some(value)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn clear(&self, key: &str) -> Result<()> {
        self.update(|map| map.remove(key).is_some()).await
    }

    #[instrument(skip_all, fields(count = entries.len()))]
    async fn set_many(&self, entries: &[(&str, String)]) -> Result<()> {
        self.update(|map| {
            let mut changed = false;
            for (key, value) in entries {
                changed |= map.insert((*key).to_string(), value.clone()).as_ref() != Some(value);
            }
            changed
        })
        .await
    }

    #[instrument(skip(self))]
    async fn clear_many(&self, keys: &[&str]) -> Result<()> {
        self.update(|map| {
            let mut changed = false;
            for key in keys {
                changed |= map.remove(*key).is_some();
            }
            changed
        })
        .await
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Write `content` to a fresh temp file in `dir`, then rename it over `path`.
///
/// Each writer gets its own temp file, so concurrent writers never share one.
fn replace_file(dir: &Path, path: &Path, content: &[u8]) -> Result<()> {
    let mut temp = tempfile::Builder::new()
        .prefix(".settings-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            Error::storage(format!(
                "Failed to create temp file in '{}': {}",
                dir.display(),
                e
            ))
        })?;

    temp.write_all(content)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| {
            Error::storage(format!(
                "Failed to write temp file '{}': {}",
                temp.path().display(),
                e
            ))
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(FILE_MODE);
        std::fs::set_permissions(temp.path(), perms).map_err(|e| {
            Error::storage(format!(
                "Failed to set file permissions on '{}': {}",
                temp.path().display(),
                e
            ))
        })?;
    }

    // A failed persist drops the temp file, which removes it.
    temp.persist(path).map_err(|e| {
        Error::storage(format!(
            "Failed to replace '{}': {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

/// Expand `~` prefix to user's home directory.
fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    if let Some(rest) = path_str.strip_prefix('~') {
        let home =
            dirs::home_dir().ok_or_else(|| Error::config("Cannot determine home directory"))?;
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        if rest.is_empty() {
            Ok(home)
        } else {
            Ok(home.join(rest))
        }
    } else {
        Ok(path.to_path_buf())
    }
}
