mod conflict;
mod error;
mod mutations;
mod queries;

pub use conflict::{conflicts, find_conflict, sort_allocations};
pub use error::EngineError;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;
use ulid::Ulid;

use crate::store::{ResourceStore, StoreError};

pub type ResourceLock = Arc<Mutex<()>>;

/// The allocation service.
///
/// Reservations on one resource are linearized by that resource's lock, held
/// from reading the existing allocations until the new one is stored. Reads
/// and deletes never take it.
pub struct Engine {
    store: Arc<dyn ResourceStore>,
    locks: DashMap<Ulid, ResourceLock>,
    store_timeout: Duration,
}

impl Engine {
    pub fn new(store: Arc<dyn ResourceStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            store_timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Run one store call under the configured timeout. Not retried.
    pub(super) async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(result) => result.map_err(EngineError::from),
            Err(_) => {
                warn!(op, timeout_ms = self.store_timeout.as_millis() as u64, "store call timed out");
                Err(EngineError::StoreTimeout(op))
            }
        }
    }

    /// Take a resource's exclusive lock, waiting at most the store timeout.
    pub(super) async fn lock_resource(&self, id: Ulid) -> Result<OwnedMutexGuard<()>, EngineError> {
        let lock = self.locks.entry(id).or_default().clone();
        tokio::time::timeout(self.store_timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                warn!(%id, "timed out waiting for resource lock");
                EngineError::LockTimeout(id)
            })
    }
}
