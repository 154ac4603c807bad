use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use placement_core::model::SessionId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per session id.
///
/// Mutating operations on the same session run one at a time; different
/// sessions never wait on each other. An entry lives only while some lease
/// holds or waits on it.
#[derive(Clone, Default)]
pub struct SessionLocks {
    inner: Arc<Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>>,
}

/// Exclusive access to one session; the map entry is dropped with the last lease.
pub struct SessionLease {
    guard: Option<OwnedMutexGuard<()>>,
    id: SessionId,
    locks: SessionLocks,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        // Unlock before the strong-count check in `release`.
        drop(self.guard.take());
        self.locks.release(self.id);
    }
}

impl SessionLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub async fn acquire(&self, id: SessionId) -> SessionLease {
        let lock = {
            let mut map = match self.inner.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(map.entry(id).or_default())
        };
        SessionLease {
            guard: Some(lock.lock_owned().await),
            id,
            locks: self.clone(),
        }
    }

    fn release(&self, id: SessionId) {
        let mut map = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Waiters hold their own clone of the mutex.
        if map.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&id);
        }
    }

    /// Sessions currently held or waited on.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |map| map.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
