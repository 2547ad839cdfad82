//! Versioned configuration snapshots with lock-free reads.
//!
//! Readers get an `Arc<ConfigSnapshot>` they can hold for the whole request;
//! a reload swaps the pointer without touching snapshots already handed out.

use ahash::AHashMap as HashMap;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::config::{validate_tasks, Config, ConfigError, TaskConfig};

/// Immutable view of the configuration valid for the duration of one request.
#[derive(Debug)]
pub struct ConfigSnapshot {
    version: u64,
    loaded_at: DateTime<Utc>,
    config: Config,
    index: HashMap<String, usize>,
}

impl ConfigSnapshot {
    fn new(version: u64, config: Config) -> Self {
        let index = config
            .tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        Self {
            version,
            loaded_at: Utc::now(),
            config,
            index,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.index.get(name).map(|&i| &self.config.tasks[i])
    }

    pub fn tasks(&self) -> &[TaskConfig] {
        &self.config.tasks
    }
}

/// Holds the active configuration snapshot.
pub struct ConfigStore {
    current: ArcSwap<ConfigSnapshot>,
    next_version: AtomicU64,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// Creates a store from an initial configuration, validating its tasks.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        validate_tasks(&config.tasks)?;
        Ok(Self {
            current: ArcSwap::from_pointee(ConfigSnapshot::new(1, config)),
            next_version: AtomicU64::new(2),
            write_lock: Mutex::new(()),
        })
    }

    /// Returns the active snapshot.
    pub fn get(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Validates and publishes a new configuration.
    ///
    /// On validation failure the active snapshot is left untouched.
    pub fn set(&self, config: Config) -> Result<Arc<ConfigSnapshot>, ConfigError> {
        validate_tasks(&config.tasks)?;

        // A poisoned lock only means a previous writer panicked; the swap itself is atomic.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        let snapshot = Arc::new(ConfigSnapshot::new(version, config));
        self.current.store(snapshot.clone());

        info!(
            "Configuration snapshot v{} published ({} tasks)",
            version,
            snapshot.tasks().len()
        );
        debug!("Active tasks: {:?}", snapshot.index.keys().collect::<Vec<_>>());
        Ok(snapshot)
    }
}
