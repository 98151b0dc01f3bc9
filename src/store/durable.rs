use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::{InMemoryStore, ResourceStore, StoreError};

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let (appended, flushed) = flush_batch(wal, batch);
    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(ref e) = flushed {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for ((_, tx), appended) in batch.drain(..).zip(appended) {
        let r = match &flushed {
            Ok(()) => appended,
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

/// Buffer each event, then fsync once. Returns the per-event append results
/// and the flush result; an event refused by the encoder leaves the rest intact.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> (Vec<io::Result<()>>, io::Result<()>) {
    let appended = batch
        .iter()
        .map(|(event, _)| wal.append_buffered(event))
        .collect();
    (appended, wal.flush_sync())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let _ = response.send(wal.compact(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Durable store: every mutation is logged and fsynced before it becomes
/// visible in the in-memory projection.
///
/// Each mutation runs on its own task, so a caller that stops waiting cannot
/// leave an event on disk that memory never saw.
pub struct WalStore {
    shared: Arc<Shared>,
}

struct Shared {
    mem: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared; compaction holds it exclusively so the
    /// snapshot and the log swap see the same state.
    gate: RwLock<()>,
}

impl WalStore {
    /// Replay the log at `path` and start its writer task. Must run inside a
    /// tokio runtime.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let replay = Wal::replay(path).map_err(wal_err)?;
        let mem = InMemoryStore::new();
        for event in &replay.events {
            mem.apply_event(event)?;
        }
        let wal = Wal::open(path, replay.valid_len).map_err(wal_err)?;
        info!(
            path = %wal.path().display(),
            events = replay.events.len(),
            resources = mem.resource_count(),
            "WAL replayed"
        );
        metrics::gauge!(observability::RESOURCES_TOTAL).set(mem.resource_count() as f64);

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));
        Ok(Self {
            shared: Arc::new(Shared {
                mem,
                wal_tx,
                gate: RwLock::new(()),
            }),
        })
    }

    /// Rewrite the log with only the events needed to recreate the current state.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let shared = self.shared.clone();
        detached(tokio::spawn(async move { shared.compact().await })).await
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .shared
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Await a mutation task. Dropping the returned future leaves the task running.
async fn detached<T>(task: JoinHandle<Result<T, StoreError>>) -> Result<T, StoreError> {
    task.await
        .map_err(|e| StoreError::Wal(format!("store task failed: {e}")))?
}

impl Shared {
    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append { event, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(wal_err)
    }

    async fn create_resource(&self, resource_type: String, name: String) -> Result<Resource, StoreError> {
        let _shared = self.gate.read().await;
        self.mem.check_resource_limit()?;
        let resource = Resource {
            id: Ulid::new(),
            resource_type,
            name,
            created_at: now(),
        };
        self.mem
            .claim_name(&resource.resource_type, &resource.name, resource.id)?;
        if let Err(e) = self.wal_append(Event::resource_created(&resource)).await {
            self.mem.release_name(&resource.resource_type, &resource.name);
            return Err(e);
        }
        self.mem.insert_resource(resource.clone());
        metrics::gauge!(observability::RESOURCES_TOTAL).set(self.mem.resource_count() as f64);
        Ok(resource)
    }

    async fn insert_allocation(&self, allocation: Allocation) -> Result<Allocation, StoreError> {
        let _shared = self.gate.read().await;
        self.mem.check_allocation(&allocation)?;
        let event =
            Event::allocation_inserted(&allocation).map_err(|e| StoreError::Encoding(e.to_string()))?;
        self.wal_append(event).await?;
        self.mem.put_allocation(allocation.clone());
        Ok(allocation)
    }

    async fn delete_allocation(&self, id: Ulid) -> Result<bool, StoreError> {
        let _shared = self.gate.read().await;
        let Some(existing) = self.mem.allocation(&id) else {
            return Ok(false);
        };
        self.wal_append(Event::AllocationDeleted {
            id,
            resource_id: existing.resource_id,
        })
        .await?;
        Ok(self.mem.remove_allocation(&id).is_some())
    }

    async fn compact(&self) -> Result<(), StoreError> {
        let _exclusive = self.gate.write().await;

        let resources = self.mem.all_resources();
        let mut events: Vec<Event> = resources.iter().map(Event::resource_created).collect();
        for resource in &resources {
            let mut allocations = self.mem.allocations_of(&resource.id);
            allocations.sort_by_key(|a| a.id);
            for allocation in &allocations {
                events.push(
                    Event::allocation_inserted(allocation)
                        .map_err(|e| StoreError::Encoding(e.to_string()))?,
                );
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Wal("WAL writer dropped response".into()))?
            .map_err(wal_err)?;
        info!("WAL compacted to {count} events");
        Ok(())
    }
}

fn wal_err(e: io::Error) -> StoreError {
    StoreError::Wal(e.to_string())
}

#[async_trait]
impl ResourceStore for WalStore {
    async fn create_resource(&self, resource_type: &str, name: &str) -> Result<Resource, StoreError> {
        let shared = self.shared.clone();
        let (resource_type, name) = (resource_type.to_string(), name.to_string());
        detached(tokio::spawn(async move {
            shared.create_resource(resource_type, name).await
        }))
        .await
    }

    async fn list_resources(&self, resource_type: &str) -> Result<Vec<Resource>, StoreError> {
        Ok(self.shared.mem.resources_of_type(resource_type))
    }

    async fn get_resource(&self, id: Ulid) -> Result<Option<Resource>, StoreError> {
        Ok(self.shared.mem.resource(&id))
    }

    async fn list_allocations(&self, resource_id: Ulid) -> Result<Vec<Allocation>, StoreError> {
        Ok(self.shared.mem.allocations_of(&resource_id))
    }

    async fn insert_allocation(&self, allocation: Allocation) -> Result<Allocation, StoreError> {
        let shared = self.shared.clone();
        detached(tokio::spawn(async move { shared.insert_allocation(allocation).await })).await
    }

    async fn get_allocation(&self, id: Ulid) -> Result<Option<Allocation>, StoreError> {
        Ok(self.shared.mem.allocation(&id))
    }

    async fn delete_allocation(&self, id: Ulid) -> Result<bool, StoreError> {
        let shared = self.shared.clone();
        detached(tokio::spawn(async move { shared.delete_allocation(id).await })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("allotment_test_store");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn new_alloc(resource: &Resource) -> Allocation {
        let mut payload = Payload::new();
        payload.insert("zeta".into(), serde_json::json!(1));
        payload.insert("alpha".into(), serde_json::json!({"nested": [1, 2]}));
        NewAllocation::new(
            Interval::bounded(ts("2024-01-01T10:00:00"), ts("2024-01-01T12:00:00")).unwrap(),
            "lease",
        )
        .with_description("morning run")
        .with_payload(payload)
        .bind(resource)
    }

    #[tokio::test]
    async fn replay_restores_resources_and_allocations() {
        let path = test_wal_path("replay.wal");
        let (r1, r2, kept, deleted) = {
            let store = WalStore::open(&path).unwrap();
            let r1 = store.create_resource("Car", "c1").await.unwrap();
            let r2 = store.create_resource("Car", "c2").await.unwrap();
            let kept = store.insert_allocation(new_alloc(&r1)).await.unwrap();
            let deleted = store.insert_allocation(new_alloc(&r2)).await.unwrap();
            assert!(store.delete_allocation(deleted.id).await.unwrap());
            (r1, r2, kept, deleted)
        };

        let store = WalStore::open(&path).unwrap();
        let cars = store.list_resources("Car").await.unwrap();
        assert_eq!(cars, vec![r1.clone(), r2.clone()]);
        assert_eq!(store.get_allocation(kept.id).await.unwrap(), Some(kept.clone()));
        assert!(store.get_allocation(deleted.id).await.unwrap().is_none());
        assert!(store.list_allocations(r2.id).await.unwrap().is_empty());

        let restored = store.get_allocation(kept.id).await.unwrap().unwrap();
        let keys: Vec<&String> = restored.payload.keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn delete_missing_writes_nothing() {
        let path = test_wal_path("delete_missing.wal");
        let store = WalStore::open(&path).unwrap();
        assert!(!store.delete_allocation(Ulid::new()).await.unwrap());
        assert_eq!(store.appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn insert_for_unknown_resource_rejected() {
        let path = test_wal_path("unknown_resource.wal");
        let store = WalStore::open(&path).unwrap();
        let ghost = Resource {
            id: Ulid::new(),
            resource_type: "Car".into(),
            name: "ghost".into(),
            created_at: now(),
        };
        let result = store.insert_allocation(new_alloc(&ghost)).await;
        assert!(matches!(result, Err(StoreError::MissingResource(_))));
        assert_eq!(store.appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn compaction_preserves_state_and_order() {
        let path = test_wal_path("compaction.wal");
        let mut ids = Vec::new();
        let live;
        {
            let store = WalStore::open(&path).unwrap();
            for i in 0..5 {
                ids.push(store.create_resource("Truck", &format!("t{i}")).await.unwrap().id);
            }
            let first = store.get_resource(ids[0]).await.unwrap().unwrap();
            for _ in 0..20 {
                let a = store.insert_allocation(new_alloc(&first)).await.unwrap();
                store.delete_allocation(a.id).await.unwrap();
            }
            live = store.insert_allocation(new_alloc(&first)).await.unwrap();
            assert_eq!(store.appends_since_compact().await, 5 + 40 + 1);

            let before = std::fs::metadata(&path).unwrap().len();
            store.compact().await.unwrap();
            let after = std::fs::metadata(&path).unwrap().len();
            assert!(after < before);
            assert_eq!(store.appends_since_compact().await, 0);
        }

        let store = WalStore::open(&path).unwrap();
        let trucks: Vec<Ulid> = store
            .list_resources("Truck")
            .await
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(trucks, ids);
        assert_eq!(store.list_allocations(ids[0]).await.unwrap(), vec![live]);
    }

    #[tokio::test]
    async fn concurrent_appends_are_all_durable() {
        let path = test_wal_path("group_commit.wal");
        let store = std::sync::Arc::new(WalStore::open(&path).unwrap());
        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create_resource("Lorry", &format!("l{i}")).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        drop(store);

        let store = WalStore::open(&path).unwrap();
        assert_eq!(store.list_resources("Lorry").await.unwrap().len(), 50);
    }

    /// Wait for a detached mutation to land in memory.
    async fn eventually(store: &WalStore, id: Ulid, present: bool) {
        for _ in 0..400 {
            if store.get_allocation(id).await.unwrap().is_some() == present {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("allocation {id} never became present={present}");
    }

    #[tokio::test]
    async fn dropped_mutation_still_applies_to_memory_and_log() {
        let path = test_wal_path("dropped_mutation.wal");
        let store = WalStore::open(&path).unwrap();
        let r = store.create_resource("Car", "c1").await.unwrap();
        let allocation = new_alloc(&r);

        // Caller gives up after the first poll
        assert!(store.insert_allocation(allocation.clone()).now_or_never().is_none());
        eventually(&store, allocation.id, true).await;
        let reopened = WalStore::open(&path).unwrap();
        assert_eq!(reopened.get_allocation(allocation.id).await.unwrap(), Some(allocation.clone()));
        drop(reopened);

        assert!(store.delete_allocation(allocation.id).now_or_never().is_none());
        eventually(&store, allocation.id, false).await;
        let reopened = WalStore::open(&path).unwrap();
        assert!(reopened.get_allocation(allocation.id).await.unwrap().is_none());
        assert_eq!(reopened.list_resources("Car").await.unwrap(), vec![r]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn duplicate_names_rejected_across_restart() {
        let path = test_wal_path("duplicate_names.wal");
        {
            let store = std::sync::Arc::new(WalStore::open(&path).unwrap());
            let mut handles = Vec::new();
            for _ in 0..8 {
                let store = store.clone();
                handles.push(tokio::spawn(async move { store.create_resource("Car", "same").await }));
            }
            let mut created = 0;
            for h in handles {
                match h.await.unwrap() {
                    Ok(_) => created += 1,
                    Err(StoreError::DuplicateName(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
            assert_eq!(created, 1);
            assert_eq!(store.appends_since_compact().await, 1);
        }

        let store = WalStore::open(&path).unwrap();
        assert!(matches!(
            store.create_resource("Car", "same").await,
            Err(StoreError::DuplicateName(_))
        ));
        store.create_resource("Lorry", "same").await.unwrap();
    }
}
