use std::time::Instant;

use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{self, outcome_label};
use crate::store::StoreError;

use super::conflict::{find_conflict, validate_new_allocation};
use super::{Engine, EngineError};

fn record(mode: &'static str, result: &Result<Allocation, EngineError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "created",
        Err(e) => outcome_label(e),
    };
    metrics::counter!(observability::ALLOCATIONS_TOTAL, "mode" => mode, "outcome" => outcome)
        .increment(1);
    metrics::histogram!(observability::ALLOCATION_DURATION_SECONDS, "mode" => mode)
        .record(started.elapsed().as_secs_f64());
}

impl Engine {
    pub async fn create_resource(&self, resource_type: &str, name: &str) -> Result<Resource, EngineError> {
        if resource_type.trim().is_empty() {
            return Err(EngineError::Validation("resource type is required".into()));
        }
        if resource_type.len() > MAX_RESOURCE_TYPE_LEN {
            return Err(EngineError::LimitExceeded("resource type too long"));
        }
        if name.trim().is_empty() {
            return Err(EngineError::Validation("name is required".into()));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("resource name too long"));
        }
        let resource = self
            .bounded("create_resource", self.store.create_resource(resource_type, name))
            .await?;
        info!(id = %resource.id, resource_type, name, "resource created");
        Ok(resource)
    }

    /// Reserve `new.interval` on one named resource.
    pub async fn create_for_resource(
        &self,
        resource_id: Ulid,
        new: NewAllocation,
    ) -> Result<Allocation, EngineError> {
        let started = Instant::now();
        let result = self.reserve_named(resource_id, new).await;
        record("resource", &result, started);
        result
    }

    /// Reserve `new.interval` on the first resource of `resource_type`, in
    /// creation order, that can take it.
    pub async fn create_for_any(
        &self,
        resource_type: &str,
        new: NewAllocation,
    ) -> Result<Allocation, EngineError> {
        let started = Instant::now();
        let result = self.reserve_first_fit(resource_type, new).await;
        record("any", &result, started);
        result
    }

    /// Delete an allocation whichever resource holds it. Unknown ids succeed
    /// and return `false`.
    pub async fn delete_allocation(&self, id: Ulid) -> Result<bool, EngineError> {
        let removed = self
            .bounded("delete_allocation", self.store.delete_allocation(id))
            .await?;
        if removed {
            metrics::counter!(observability::DELETES_TOTAL).increment(1);
            info!(%id, "allocation deleted");
        } else {
            debug!(%id, "delete of unknown allocation ignored");
        }
        Ok(removed)
    }

    async fn reserve_named(&self, resource_id: Ulid, new: NewAllocation) -> Result<Allocation, EngineError> {
        validate_new_allocation(&new)?;
        let resource = self
            .bounded("get_resource", self.store.get_resource(resource_id))
            .await?
            .ok_or(EngineError::NotFound(resource_id))?;

        let guard = self.lock_resource(resource_id).await?;
        self.check_and_insert(&resource, &new, guard).await
    }

    async fn reserve_first_fit(
        &self,
        resource_type: &str,
        new: NewAllocation,
    ) -> Result<Allocation, EngineError> {
        validate_new_allocation(&new)?;
        let candidates = self
            .bounded("list_resources", self.store.list_resources(resource_type))
            .await?;
        debug!(resource_type, candidates = candidates.len(), "looking for a free resource");

        // Each candidate is re-read under its own lock, so a concurrent winner
        // is seen and we fall through to the next one.
        for resource in &candidates {
            metrics::counter!(observability::CANDIDATES_SCANNED_TOTAL).increment(1);
            let guard = self.lock_resource(resource.id).await?;
            match self.check_and_insert(resource, &new, guard).await {
                Ok(allocation) => return Ok(allocation),
                Err(EngineError::Conflict(blocking)) => {
                    debug!(resource = %resource.id, %blocking, "resource taken, trying next");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(resource_type, "no resource available");
        Err(EngineError::NoResourceAvailable(resource_type.to_string()))
    }

    /// Read-check-write for one resource under its lock.
    ///
    /// The insert runs on its own task that owns `guard`, so when the caller
    /// times out the resource stays locked until the insert has landed.
    async fn check_and_insert(
        &self,
        resource: &Resource,
        new: &NewAllocation,
        guard: OwnedMutexGuard<()>,
    ) -> Result<Allocation, EngineError> {
        let existing = self
            .bounded("list_allocations", self.store.list_allocations(resource.id))
            .await?;
        debug!(resource = %resource.id, existing = existing.len(), "checking overlap");
        if let Some(blocking) = find_conflict(&existing, &new.interval) {
            return Err(EngineError::Conflict(blocking));
        }

        let store = self.store.clone();
        let pending = new.clone().bind(resource);
        let commit = tokio::spawn(async move {
            let _guard = guard;
            store.insert_allocation(pending).await
        });
        let allocation = self
            .bounded("insert_allocation", async move {
                commit
                    .await
                    .map_err(|e| StoreError::Wal(format!("insert task failed: {e}")))
                    .and_then(|inserted| inserted)
            })
            .await?;
        info!(
            id = %allocation.id,
            resource = %resource.id,
            resource_type = %resource.resource_type,
            allocation_type = %allocation.allocation_type,
            "allocation created"
        );
        Ok(allocation)
    }
}
