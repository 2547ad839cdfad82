//! Configuration reload.
//!
//! A reload re-reads the configuration through a [`ConfigLoader`], validates
//! it and publishes a new snapshot. Reloads are serialized; a failed reload
//! leaves the active snapshot in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::{load_config, Config, ConfigError};
use crate::config_store::{ConfigSnapshot, ConfigStore};

/// Produces a fresh configuration on demand.
pub trait ConfigLoader: Send + Sync {
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Reads the configuration file the exporter was started with.
#[derive(Debug, Clone)]
pub struct FileConfigLoader {
    path: PathBuf,
}

impl FileConfigLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigLoader for FileConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        load_config(&self.path)
    }
}

pub struct ReloadController {
    store: Arc<ConfigStore>,
    loader: Arc<dyn ConfigLoader>,
    lock: Mutex<()>,
}

impl ReloadController {
    pub fn new(store: Arc<ConfigStore>, loader: Arc<dyn ConfigLoader>) -> Self {
        Self {
            store,
            loader,
            lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    /// Loads, validates and publishes the configuration.
    pub async fn reload(&self) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        let _guard = self.lock.lock().await;
        let previous = self.store.get().version();

        // File access stays off the async workers.
        let loader = self.loader.clone();
        let config = tokio::task::spawn_blocking(move || loader.load())
            .await
            .map_err(|e| ConfigError::Loader(e.to_string()))
            .and_then(|loaded| loaded)
            .map_err(|e| {
                error!("Reload failed, keeping configuration v{}: {}", previous, e);
                e
            })?;

        match self.store.set(config) {
            Ok(snapshot) => {
                info!(
                    "Configuration reloaded: v{} -> v{}",
                    previous,
                    snapshot.version()
                );
                Ok(snapshot)
            }
            Err(e) => {
                error!("Reload failed, keeping configuration v{}: {}", previous, e);
                Err(e)
            }
        }
    }
}
