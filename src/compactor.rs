use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Compact the WAL if enough appends accumulated. Returns whether it ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            info!(appends, "compacted WAL");
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task that periodically compacts the WAL once `threshold`
/// appends have accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("jadwal_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn register_rooms(engine: &Engine, n: usize) {
        for i in 0..n {
            engine
                .register_room(Room {
                    id: Ulid::new(),
                    name: format!("Ruang {i}"),
                    capacity: 20,
                })
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn below_threshold_is_skipped() {
        let engine = Engine::new(test_wal_path("below.wal"), Arc::new(NotifyHub::new())).unwrap();
        register_rooms(&engine, 3).await;
        assert!(!compact_if_due(&engine, 10).await);
        assert_eq!(engine.wal_appends_since_compact().await, 3);
    }

    #[tokio::test]
    async fn at_threshold_compacts_and_resets() {
        let path = test_wal_path("at_threshold.wal");
        let engine = Engine::new(path.clone(), Arc::new(NotifyHub::new())).unwrap();
        register_rooms(&engine, 4).await;
        assert!(compact_if_due(&engine, 4).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);

        let replayed = crate::wal::Wal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 4);
        assert!(replayed.iter().all(Event::is_catalog));
    }
}
