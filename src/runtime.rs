use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::compactor;
use crate::config::Config;
use crate::engine::Engine;
use crate::registry::{ResourceKind, TypeRegistry};
use crate::store::WalStore;

pub const WAL_FILE_NAME: &str = "allotment.wal";

/// A running service: durable store, engine, type registry and compactor.
pub struct Runtime {
    engine: Arc<Engine>,
    store: Arc<WalStore>,
    registry: TypeRegistry,
    compactor: JoinHandle<()>,
}

impl Runtime {
    /// Open the store under `config.data_dir` and start background tasks.
    /// Must run inside a tokio runtime.
    pub fn start(config: Config) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        std::fs::create_dir_all(&config.data_dir)?;
        crate::observability::init_metrics(config.metrics_port)?;

        let wal_path = config.data_dir.join(WAL_FILE_NAME);
        let store = Arc::new(WalStore::open(&wal_path)?);
        let engine = Arc::new(Engine::new(store.clone(), config.store_timeout));

        let compactor = tokio::spawn(compactor::run_compactor(
            store.clone(),
            config.compact_threshold,
            config.compact_interval,
        ));

        info!("allotment started");
        info!("  data_dir: {}", config.data_dir.display());
        info!("  store_timeout: {:?}", config.store_timeout);
        info!("  compact: every {:?} past {} appends", config.compact_interval, config.compact_threshold);
        info!(
            "  resource types: {}",
            config
                .registry
                .iter()
                .map(|k| format!("{}/{}", k.resource_type, k.prefix))
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            engine,
            store,
            registry: config.registry,
            compactor,
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<WalStore> {
        &self.store
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// The kind served under a route prefix such as `cars`.
    pub fn resolve(&self, prefix: &str) -> Option<&ResourceKind> {
        self.registry.resolve(prefix)
    }

    /// Stop the compactor. In-flight engine calls are unaffected.
    pub fn shutdown(self) {
        self.compactor.abort();
        info!("allotment stopped");
    }
}
