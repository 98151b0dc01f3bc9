//! Persistence contract consumed by the engine.
//!
//! The engine serializes reservations per resource before calling
//! [`ResourceStore::insert_allocation`], so implementations only need each
//! individual call to be atomic: an insert is either fully visible to later
//! reads or not at all.

mod durable;
mod memory;

pub use durable::WalStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use ulid::Ulid;

use crate::model::{Allocation, Resource};

#[derive(Debug)]
pub enum StoreError {
    /// The resource an allocation points at does not exist.
    MissingResource(Ulid),
    /// A resource of the same type already has this name.
    DuplicateName(String),
    LimitExceeded(&'static str),
    Wal(String),
    Encoding(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::MissingResource(id) => write!(f, "no such resource: {id}"),
            StoreError::DuplicateName(name) => write!(f, "resource name already taken: {name}"),
            StoreError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            StoreError::Wal(e) => write!(f, "WAL error: {e}"),
            StoreError::Encoding(e) => write!(f, "encoding error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create and persist a new resource with a fresh id. Names are unique per type.
    async fn create_resource(&self, resource_type: &str, name: &str) -> Result<Resource, StoreError>;

    /// All resources of a type, in creation order.
    async fn list_resources(&self, resource_type: &str) -> Result<Vec<Resource>, StoreError>;

    async fn get_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError>;

    /// Allocations of a resource in no particular order; empty for unknown ids.
    async fn list_allocations(&self, resource_id: Ulid) -> Result<Vec<Allocation>, StoreError>;

    async fn insert_allocation(&self, allocation: Allocation) -> Result<Allocation, StoreError>;

    async fn get_allocation(&self, id: Ulid) -> Result<Option<Allocation>, StoreError>;

    /// Remove an allocation. Returns `false` when nothing had that id.
    async fn delete_allocation(&self, id: Ulid) -> Result<bool, StoreError>;
}
