//! On-disk home of a persisted index.

use crate::config::CacheConfig;
use crate::error::{Result, VaultError};
use crate::store::NoteStore;
use serde::de::DeserializeOwned;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const LOCK_FILE: &str = "index.lock";
const LOCK_ATTEMPTS: u32 = 50;
const LOCK_WAIT: Duration = Duration::from_millis(100);

/// The directory holding `meta.json` and `index.json` for one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheDir {
    path: PathBuf,
}

impl CacheDir {
    /// `<vault>/.vaultnote/cache` for a local cache, otherwise
    /// `<user cache dir>/vaultnote/<hash of the vault path>`.
    pub fn for_vault(vault_root: &Path, config: &CacheConfig) -> Self {
        let path = if config.location == "local" {
            vault_root.join(".vaultnote").join("cache")
        } else {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            vault_root.hash(&mut hasher);
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("vaultnote")
                .join(format!("{:016x}", hasher.finish()))
        };
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse one cache file. `Ok(None)` when it was never written.
    pub fn read_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.path.join(name);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(VaultError::IndexError(format!("Failed to read {}: {}", name, e))),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| VaultError::IndexError(format!("Failed to parse {}: {}", name, e)))
    }

    /// Replace the named files through `store`, holding the cross-process
    /// cache lock for the whole batch.
    pub fn write_files(&self, store: &dyn NoteStore, files: &[(&str, String)]) -> Result<()> {
        fs::create_dir_all(&self.path)
            .map_err(|e| VaultError::IndexError(format!("Failed to create cache directory: {}", e)))?;
        let _lock = self.lock()?;
        for (name, content) in files {
            store
                .write_atomic(&self.path.join(name), content.as_bytes())
                .map_err(|e| VaultError::IndexError(format!("Failed to write {}: {}", name, e)))?;
        }
        Ok(())
    }

    /// Delete the directory and everything in it.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::IndexError(format!("Failed to clear cache: {}", e))),
        }
    }

    fn lock(&self) -> Result<CacheLock> {
        let path = self.path.join(LOCK_FILE);
        for _ in 0..LOCK_ATTEMPTS {
            match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(CacheLock { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => thread::sleep(LOCK_WAIT),
                Err(e) => return Err(VaultError::IndexError(format!("Failed to acquire index lock: {}", e))),
            }
        }
        Err(VaultError::IndexError("Index is locked by another process".to_string()))
    }
}

/// Removes the lock file when dropped.
#[derive(Debug)]
struct CacheLock {
    path: PathBuf,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
