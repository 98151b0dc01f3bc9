use ulid::Ulid;

use crate::model::*;

use super::conflict::sort_allocations;
use super::{Engine, EngineError};

impl Engine {
    /// Resources of a type in creation order.
    pub async fn list_resources(&self, resource_type: &str) -> Result<Vec<Resource>, EngineError> {
        self.bounded("list_resources", self.store.list_resources(resource_type))
            .await
    }

    pub async fn get_resource(&self, id: Ulid) -> Result<Resource, EngineError> {
        self.bounded("get_resource", self.store.get_resource(id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// A resource's allocations ordered by end, then start.
    pub async fn list_allocations(&self, resource_id: Ulid) -> Result<Vec<Allocation>, EngineError> {
        self.get_resource(resource_id).await?;
        let mut allocations = self
            .bounded("list_allocations", self.store.list_allocations(resource_id))
            .await?;
        sort_allocations(&mut allocations);
        Ok(allocations)
    }

    pub async fn get_allocation(&self, id: Ulid) -> Result<Allocation, EngineError> {
        self.bounded("get_allocation", self.store.get_allocation(id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }
}
