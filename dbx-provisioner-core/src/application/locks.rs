// dbx-provisioner-core/src/application/locks.rs

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per workspace key. Requests on different workspaces never
/// wait on each other.
#[derive(Debug, Default, Clone)]
pub struct WorkspaceLocks {
    arena: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the workspace; the guard releases it on drop.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        // Clone the Arc out so no shard lock is held across the await.
        let lock = self
            .arena
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drops entries nobody holds or waits for.
    pub fn prune(&self) {
        self.arena.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }
}
