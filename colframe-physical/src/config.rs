//! This module defines [StorageConfig], the tunable parameters of the storage layer.

use std::{
    path::PathBuf,
    str::FromStr,
    sync::{PoisonError, RwLock},
};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Global instance of the [StorageConfig]
static CONFIG_INSTANCE: Lazy<RwLock<StorageConfig>> =
    Lazy::new(|| RwLock::new(StorageConfig::from_env()));

/// Parameters that control resource usage of buffers and columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Maximal number of file mappings that may be live at the same time.
    /// Mapping beyond this number evicts the least recently used regions.
    pub max_mappings: usize,
    /// How often mapping a file is retried after evicting another mapping
    /// when the operating system reports resource exhaustion.
    pub mmap_retries: usize,
    /// Number of worker threads; `None` lets the thread pool decide.
    pub nthreads: Option<usize>,
    /// Columns with fewer rows are always materialized on the calling thread.
    pub min_rows_parallel: usize,
    /// Directory for scratch files; `None` uses the system default.
    pub temp_dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            // Linux' default `vm.max_map_count` is 65530, leave room for the allocator.
            max_mappings: 32768,
            mmap_retries: 3,
            nthreads: None,
            min_rows_parallel: 10_000,
            temp_dir: None,
        }
    }
}

impl StorageConfig {
    /// Environment variable overriding [StorageConfig::max_mappings].
    pub const ENV_MAX_MAPPINGS: &'static str = "COLFRAME_MAX_MAPPINGS";
    /// Environment variable overriding [StorageConfig::mmap_retries].
    pub const ENV_MMAP_RETRIES: &'static str = "COLFRAME_MMAP_RETRIES";
    /// Environment variable overriding [StorageConfig::nthreads].
    pub const ENV_NTHREADS: &'static str = "COLFRAME_NTHREADS";
    /// Environment variable overriding [StorageConfig::min_rows_parallel].
    pub const ENV_MIN_ROWS_PARALLEL: &'static str = "COLFRAME_MIN_ROWS_PARALLEL";
    /// Environment variable overriding [StorageConfig::temp_dir].
    pub const ENV_TEMP_DIR: &'static str = "COLFRAME_TEMP_DIR";

    /// Returns the default configuration with every field overridden
    /// by its environment variable, if that is set to a valid value.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(value) = parse_env(Self::ENV_MAX_MAPPINGS) {
            config.max_mappings = value;
        }
        if let Some(value) = parse_env(Self::ENV_MMAP_RETRIES) {
            config.mmap_retries = value;
        }
        if let Some(value) = parse_env::<usize>(Self::ENV_NTHREADS) {
            config.nthreads = (value > 0).then_some(value);
        }
        if let Some(value) = parse_env(Self::ENV_MIN_ROWS_PARALLEL) {
            config.min_rows_parallel = value;
        }
        if let Ok(value) = std::env::var(Self::ENV_TEMP_DIR) {
            if !value.is_empty() {
                config.temp_dir = Some(PathBuf::from(value));
            }
        }

        config
    }

    /// Returns a copy of the process-wide configuration.
    pub fn current() -> Self {
        CONFIG_INSTANCE
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Makes this the process-wide configuration.
    ///
    /// Components that were already initialized (the thread pool and
    /// the global mmap manager) keep the settings they were created with.
    pub fn install(self) {
        log::debug!("Installing storage configuration {self:?}");
        *CONFIG_INSTANCE
            .write()
            .unwrap_or_else(PoisonError::into_inner) = self;
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("Ignoring invalid value {raw:?} of environment variable {name}");
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::StorageConfig;
    use test_log::test;

    #[test]
    fn defaults_are_sane() {
        let config = StorageConfig::default();
        assert!(config.max_mappings > 0);
        assert!(config.mmap_retries > 0);
        assert_eq!(config.nthreads, None);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: StorageConfig = deserialize_single("max_mappings", 4);
        assert_eq!(config.max_mappings, 4);
        assert_eq!(config.mmap_retries, StorageConfig::default().mmap_retries);
    }

    /// Deserializes a config with a single overridden field,
    /// going through serde's value-based deserializer.
    fn deserialize_single(field: &'static str, value: usize) -> StorageConfig {
        use serde::de::value::{Error, MapDeserializer};
        use serde::Deserialize;

        let deserializer: MapDeserializer<'_, _, Error> =
            MapDeserializer::new(vec![(field, value)].into_iter());
        StorageConfig::deserialize(deserializer).expect("valid config")
    }
}
