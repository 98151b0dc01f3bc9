use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::store::WalStore;

/// Background task that rewrites the WAL once enough appends have piled up.
pub async fn run_compactor(store: Arc<WalStore>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    // The first tick fires immediately; nothing has been appended yet.
    interval.tick().await;
    loop {
        interval.tick().await;
        compact_if_due(&store, threshold).await;
    }
}

/// Compact when the append count has reached `threshold`. Returns whether it ran.
pub async fn compact_if_due(store: &WalStore, threshold: u64) -> bool {
    let appends = store.appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return false;
    }
    match store.compact().await {
        Ok(()) => {
            info!(appends, "compacted WAL");
            true
        }
        Err(e) => {
            // Left for the next tick
            warn!("compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ResourceStore;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("allotment_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let path = test_wal_path("threshold.wal");
        let store = WalStore::open(&path).unwrap();
        for i in 0..3 {
            store.create_resource("Car", &format!("c{i}")).await.unwrap();
        }

        assert!(!compact_if_due(&store, 10).await);
        assert_eq!(store.appends_since_compact().await, 3);

        assert!(compact_if_due(&store, 3).await);
        assert_eq!(store.appends_since_compact().await, 0);
        assert_eq!(store.list_resources("Car").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn background_task_compacts() {
        let path = test_wal_path("background.wal");
        let store = Arc::new(WalStore::open(&path).unwrap());
        for i in 0..5 {
            store.create_resource("Truck", &format!("t{i}")).await.unwrap();
        }

        let task = tokio::spawn(run_compactor(store.clone(), 1, Duration::from_millis(10)));
        let mut compacted = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.appends_since_compact().await == 0 {
                compacted = true;
                break;
            }
        }
        task.abort();
        assert!(compacted);
    }
}
