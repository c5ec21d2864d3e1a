//! ==============================================================================
//! cache.rs - latest-snapshot poll cache
//! ==============================================================================
//!
//! purpose:
//!     holds the most recent full snapshot of all sensors. the poll loop is
//!     the only writer; HTTP handlers and the push dispatcher are readers.
//!     the snapshot is replaced wholesale behind an `Arc`, so a reader always
//!     sees either the previous complete snapshot or the new one, never a
//!     mix. the write lock is held only for the pointer swap and readers
//!     only hold the read lock long enough to clone the `Arc`.
//!
//! relationships:
//!     - uses: sensors.rs (both reader branches, via spawn_blocking)
//!     - used by: main.rs (refresh on the poll timer)
//!     - used by: server.rs (snapshot for /sensors and /health)
//!
//! ==============================================================================

use crate::domain::Reading;
use crate::sensors::{self, SensorMap};

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct PollCache {
    w1_path: PathBuf,
    iio_path: Option<PathBuf>,
    map: SensorMap,
    snapshot: RwLock<Arc<Vec<Reading>>>,
}

impl PollCache {
    pub fn new(w1_path: PathBuf, iio_path: Option<PathBuf>, map: SensorMap) -> Self {
        Self {
            w1_path,
            iio_path,
            map,
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// run both device branches and replace the cached snapshot.
    ///
    /// the sysfs reads are synchronous file I/O and run on the blocking
    /// pool. returns the new snapshot so the caller can hand the same
    /// immutable copy to the push path without re-reading the cache.
    pub async fn refresh(&self) -> Arc<Vec<Reading>> {
        let w1_path = self.w1_path.clone();
        let iio_path = self.iio_path.clone();
        let map = self.map.clone();

        let readings = tokio::task::spawn_blocking(move || {
            sensors::read_all(&w1_path, iio_path.as_deref(), &map)
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!("poll task panicked: {}", e);
            Vec::new()
        });

        tracing::info!("polled {} sensors", readings.len());

        let readings = Arc::new(readings);
        *self.snapshot.write().await = readings.clone();
        readings
    }

    /// current snapshot; empty until the first refresh completes.
    pub async fn snapshot(&self) -> Arc<Vec<Reading>> {
        self.snapshot.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn fixture_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("sensor_hub_cache_test").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_w1_device(base: &Path, addr: &str, temp_line: &str) {
        let dir = base.join(addr);
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("w1_slave"),
            format!("aa : crc=f4 YES\naa {temp_line}\n"),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_empty_until_first_refresh() {
        let cache = PollCache::new(
            PathBuf::from("/nonexistent"),
            None,
            SensorMap::default(),
        );
        assert!(cache.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_publishes_snapshot() {
        let base = fixture_dir("refresh_publishes");
        write_w1_device(&base, "28-000000000001", "t=21500");

        let cache = PollCache::new(base, None, SensorMap::default());
        let published = cache.refresh().await;

        assert_eq!(published.len(), 1);
        assert_eq!(published[0].value, "21.500");
        assert_eq!(*cache.snapshot().await, *published);
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let base = fixture_dir("refresh_replaces");
        write_w1_device(&base, "28-000000000001", "t=21500");
        write_w1_device(&base, "28-000000000002", "t=22500");

        let cache = PollCache::new(base.clone(), None, SensorMap::default());
        cache.refresh().await;
        assert_eq!(cache.snapshot().await.len(), 2);

        // a device disappearing from the bus leaves no stale entry behind
        fs::remove_dir_all(base.join("28-000000000002")).unwrap();
        cache.refresh().await;

        let snapshot = cache.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, "21.500");
    }

    #[tokio::test]
    async fn test_old_snapshot_survives_refresh() {
        let base = fixture_dir("refresh_immutable");
        write_w1_device(&base, "28-000000000001", "t=21500");

        let cache = PollCache::new(base.clone(), None, SensorMap::default());
        cache.refresh().await;
        let before = cache.snapshot().await;

        write_w1_device(&base, "28-000000000001", "t=99000");
        cache.refresh().await;

        // a reader holding the previous Arc still sees a consistent snapshot
        assert_eq!(before[0].value, "21.500");
        assert_eq!(cache.snapshot().await[0].value, "99.000");
    }
}
