use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineError;
use crate::registry::TypeRegistry;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_COMPACT_INTERVAL_SECS: u64 = 30;

/// Runtime settings, read from `ALLOTMENT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    /// Upper bound on any single store call and on waiting for a resource lock.
    pub store_timeout: Duration,
    pub metrics_port: Option<u16>,
    pub registry: TypeRegistry,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            compact_threshold: DEFAULT_COMPACT_THRESHOLD,
            compact_interval: Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS),
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            metrics_port: None,
            registry: TypeRegistry::with_defaults(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparseable numbers fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, EngineError> {
        let defaults = Self::default();
        let number = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let registry = match lookup("ALLOTMENT_RESOURCE_TYPES") {
            Some(list) => TypeRegistry::parse(&list)?,
            None => defaults.registry,
        };

        Ok(Self {
            data_dir: lookup("ALLOTMENT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: number("ALLOTMENT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: number("ALLOTMENT_COMPACT_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            store_timeout: number("ALLOTMENT_STORE_TIMEOUT_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            metrics_port: lookup("ALLOTMENT_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            registry,
        })
    }
}
