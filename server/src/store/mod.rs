//! Persistence for the rewrite configuration
//!
//! A request loads one snapshot at its start and uses it throughout. Saves
//! replace the stored document as a whole, so a reader sees either the old
//! or the new configuration, never a mix.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::{StoreConfig, StoreKind};
use crate::models::ProxyConfig;

/// File name of the persisted document inside the data directory
pub const CONFIG_FILE_NAME: &str = "proxy-config.json";

/// Config store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored configuration at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("config store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Load/save contract for the rewrite configuration
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// The stored configuration, or the default when nothing was saved yet
    async fn load(&self) -> Result<ProxyConfig, StoreError>;

    /// Replace the stored configuration
    async fn save(&self, config: &ProxyConfig) -> Result<(), StoreError>;
}

/// Build the store selected by the process configuration
pub fn from_config(config: &StoreConfig) -> Arc<dyn ConfigStore> {
    match config.kind {
        StoreKind::File => {
            let store = FileConfigStore::new(config.data_dir.join(CONFIG_FILE_NAME));
            info!(path = %store.path().display(), "Using file config store");
            Arc::new(store)
        }
        StoreKind::Memory => {
            info!("Using in-memory config store; rules are lost on restart");
            Arc::new(MemoryConfigStore::default())
        }
    }
}

/// JSON document on disk, replaced atomically on save
pub struct FileConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<ProxyConfig, StoreError> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored configuration, using defaults");
                return Ok(ProxyConfig::default());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    async fn save(&self, config: &ProxyConfig) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(config)?;
        let _guard = self.write_lock.lock().await;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &content)).await??;

        info!(
            path = %self.path.display(),
            fix_timestamps = config.fix_timestamps,
            filename_rules = config.filename_rules.len(),
            location_rules = config.location_rules.len(),
            "Configuration saved"
        );
        Ok(())
    }
}

/// Write to a temp file beside `path`, then rename it over `path`
fn write_atomically(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    use std::io::Write;

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Process-local store
#[derive(Default)]
pub struct MemoryConfigStore {
    config: RwLock<ProxyConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<ProxyConfig, StoreError> {
        Ok(self.config.read().await.clone())
    }

    async fn save(&self, config: &ProxyConfig) -> Result<(), StoreError> {
        *self.config.write().await = config.clone();
        Ok(())
    }
}
