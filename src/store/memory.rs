use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{ResourceStore, StoreError};

/// Volatile store. Also serves as the in-memory projection of [`super::WalStore`].
pub struct InMemoryStore {
    resources: DashMap<Ulid, Resource>,
    /// Resource type → resource ids in creation order.
    by_type: DashMap<String, Vec<Ulid>>,
    /// (resource type, name) → resource id. Names are unique within a type.
    names: DashMap<(String, String), Ulid>,
    allocations: DashMap<Ulid, Allocation>,
    /// Resource id → allocation ids.
    by_resource: DashMap<Ulid, Vec<Ulid>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            by_type: DashMap::new(),
            names: DashMap::new(),
            allocations: DashMap::new(),
            by_resource: DashMap::new(),
        }
    }

    // ── Resources ────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn contains_resource(&self, id: &Ulid) -> bool {
        self.resources.contains_key(id)
    }

    pub fn resource(&self, id: &Ulid) -> Option<Resource> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub(super) fn check_resource_limit(&self) -> Result<(), StoreError> {
        if self.resources.len() >= MAX_RESOURCES {
            return Err(StoreError::LimitExceeded("too many resources"));
        }
        Ok(())
    }

    /// Reserve `name` within `resource_type` for `id`.
    pub(super) fn claim_name(&self, resource_type: &str, name: &str, id: Ulid) -> Result<(), StoreError> {
        match self.names.entry((resource_type.to_string(), name.to_string())) {
            Entry::Occupied(_) => Err(StoreError::DuplicateName(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    pub(super) fn release_name(&self, resource_type: &str, name: &str) {
        self.names.remove(&(resource_type.to_string(), name.to_string()));
    }

    pub fn insert_resource(&self, resource: Resource) {
        self.names
            .insert((resource.resource_type.clone(), resource.name.clone()), resource.id);
        self.by_type
            .entry(resource.resource_type.clone())
            .or_default()
            .push(resource.id);
        self.resources.insert(resource.id, resource);
    }

    pub fn resources_of_type(&self, resource_type: &str) -> Vec<Resource> {
        let ids = self
            .by_type
            .get(resource_type)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.resource(id)).collect()
    }

    /// Every resource, grouped by type in name order, each group in creation order.
    pub fn all_resources(&self) -> Vec<Resource> {
        let mut types: Vec<String> = self.by_type.iter().map(|e| e.key().clone()).collect();
        types.sort();
        types
            .iter()
            .flat_map(|t| self.resources_of_type(t))
            .collect()
    }

    // ── Allocations ──────────────────────────────────────────

    pub fn allocation(&self, id: &Ulid) -> Option<Allocation> {
        self.allocations.get(id).map(|e| e.value().clone())
    }

    pub fn allocations_of(&self, resource_id: &Ulid) -> Vec<Allocation> {
        let ids = self
            .by_resource
            .get(resource_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.allocation(id)).collect()
    }

    pub(super) fn check_allocation(&self, allocation: &Allocation) -> Result<(), StoreError> {
        if !self.contains_resource(&allocation.resource_id) {
            return Err(StoreError::MissingResource(allocation.resource_id));
        }
        let live = self
            .by_resource
            .get(&allocation.resource_id)
            .map_or(0, |ids| ids.len());
        if live >= MAX_ALLOCATIONS_PER_RESOURCE {
            return Err(StoreError::LimitExceeded("too many allocations on resource"));
        }
        Ok(())
    }

    pub fn put_allocation(&self, allocation: Allocation) {
        self.by_resource
            .entry(allocation.resource_id)
            .or_default()
            .push(allocation.id);
        self.allocations.insert(allocation.id, allocation);
    }

    /// Remove an allocation and its index entry.
    pub fn remove_allocation(&self, id: &Ulid) -> Option<Allocation> {
        let (_, allocation) = self.allocations.remove(id)?;
        if let Some(mut ids) = self.by_resource.get_mut(&allocation.resource_id) {
            ids.retain(|a| a != id);
        }
        Some(allocation)
    }

    // ── Event application ────────────────────────────────────

    pub fn apply_event(&self, event: &Event) -> Result<(), StoreError> {
        match event {
            Event::ResourceCreated {
                id,
                resource_type,
                name,
                created_at,
            } => {
                self.insert_resource(Resource {
                    id: *id,
                    resource_type: resource_type.clone(),
                    name: name.clone(),
                    created_at: *created_at,
                });
            }
            Event::AllocationInserted {
                id,
                resource_id,
                resource_type,
                interval,
                allocation_type,
                description,
                payload,
                created_at,
            } => {
                let payload: Payload = serde_json::from_str(payload)
                    .map_err(|e| StoreError::Encoding(e.to_string()))?;
                self.put_allocation(Allocation {
                    id: *id,
                    resource_id: *resource_id,
                    resource_type: resource_type.clone(),
                    interval: *interval,
                    allocation_type: allocation_type.clone(),
                    description: description.clone(),
                    payload,
                    created_at: *created_at,
                });
            }
            Event::AllocationDeleted { id, .. } => {
                self.remove_allocation(id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn create_resource(&self, resource_type: &str, name: &str) -> Result<Resource, StoreError> {
        self.check_resource_limit()?;
        let resource = Resource {
            id: Ulid::new(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            created_at: now(),
        };
        self.claim_name(resource_type, name, resource.id)?;
        self.insert_resource(resource.clone());
        Ok(resource)
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<Resource>, StoreError> {
        Ok(self.resources_of_type(resource_type))
    }

    async fn get_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError> {
        Ok(self.resource(&id))
    }

    async fn list_allocations(&self, resource_id: Ulid) -> Result<Vec<Allocation>, StoreError> {
        Ok(self.allocations_of(&resource_id))
    }

    async fn insert_allocation(&self, allocation: Allocation) -> Result<Allocation, StoreError> {
        self.check_allocation(&allocation)?;
        self.put_allocation(allocation.clone());
        Ok(allocation)
    }

    async fn get_allocation(&self, id: Ulid) -> Result<Option<Allocation>, StoreError> {
        Ok(self.allocation(&id))
    }

    async fn delete_allocation(&self, id: Ulid) -> Result<bool, StoreError> {
        Ok(self.remove_allocation(&id).is_some())
    }
}
