use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>;

fn lock_map(map: &LockMap) -> MutexGuard<'_, HashMap<Uuid, Arc<AsyncMutex<()>>>> {
    match map.lock() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-record write serialization: at most one read-modify-write on a given
/// stored record at a time. Distinct records never contend.
///
/// Entries live only while a guard or waiter holds them, so the map is
/// bounded by the number of records currently in flight.
#[derive(Clone, Default)]
pub struct RecordLocks {
    inner: LockMap,
}

/// Held for the duration of one record update.
pub struct RecordGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: Uuid,
    map: LockMap,
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = lock_map(&self.map);
        if let Some(entry) = map.get(&self.key) {
            // Only the map's own reference left: nobody holds or awaits it.
            if Arc::strong_count(entry) == 1 {
                map.remove(&self.key);
            }
        }
    }
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: Uuid) -> RecordGuard {
        let lock = lock_map(&self.inner)
            .entry(key)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        RecordGuard {
            guard: Some(guard),
            key,
            map: self.inner.clone(),
        }
    }

    /// Number of records with a live lock entry.
    pub fn len(&self) -> usize {
        lock_map(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
