//! Outdated Entry Cleanup Task
//!
//! Background task that periodically sweeps outdated entries out of a cache,
//! keeping the O(n) scan off request paths.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::StorableCache;

/// Spawns a background task that periodically calls `delete_outdated`.
///
/// Each sweep runs on the blocking pool since storage calls are synchronous.
///
/// # Arguments
/// * `cache` - Shared reference to the cache
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task; abort it to stop sweeping.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(Mutex::new(StorableCache::new(&config)?));
/// let cleanup_handle = spawn_cleanup_task(cache.clone(), config.sweep_interval);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(
    cache: Arc<Mutex<StorableCache>>,
    cleanup_interval_secs: u64,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting outdated entry cleanup task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let cache = cache.clone();
            let swept =
                tokio::task::spawn_blocking(move || cache.blocking_lock().delete_outdated()).await;

            match swept {
                Ok(true) => debug!("Cleanup: outdated entries swept"),
                Ok(false) => warn!("Cleanup: storage could not be scanned"),
                Err(e) => warn!("Cleanup: sweep task failed: {}", e),
            }
        }
    })
}
