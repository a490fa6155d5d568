use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use shared::domain::LocalHandle;
use tracing::debug;

use crate::lifecycle::OutgoingFile;

/// Platform facility that turns a user-supplied file into something the
/// presenter can preview before upload completes.
pub trait PreviewStore: Send + Sync {
    fn allocate(&self, file: &OutgoingFile) -> LocalHandle;
    fn revoke(&self, handle: LocalHandle);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Keeps preview bytes in memory until revoked.
#[derive(Default)]
pub struct InMemoryPreviewStore {
    next_handle: AtomicU64,
    live: Mutex<HashMap<LocalHandle, Arc<[u8]>>>,
    revocations: Mutex<Vec<LocalHandle>>,
}

impl InMemoryPreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self, handle: LocalHandle) -> Option<Arc<[u8]>> {
        lock(&self.live).get(&handle).cloned()
    }

    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Every revoke call in arrival order, including repeats.
    pub fn revocations(&self) -> Vec<LocalHandle> {
        lock(&self.revocations).clone()
    }
}

impl PreviewStore for InMemoryPreviewStore {
    fn allocate(&self, file: &OutgoingFile) -> LocalHandle {
        let handle = LocalHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        lock(&self.live).insert(handle, Arc::clone(&file.bytes));
        handle
    }

    fn revoke(&self, handle: LocalHandle) {
        lock(&self.live).remove(&handle);
        lock(&self.revocations).push(handle);
    }
}

/// Sole owner of locally allocated preview handles. Each handle belongs to at
/// most one bucket and is revoked at most once.
pub struct ResourceTracker {
    store: Arc<dyn PreviewStore>,
    buckets: HashMap<String, Vec<LocalHandle>>,
    owners: HashMap<LocalHandle, String>,
    released: HashSet<LocalHandle>,
}

impl ResourceTracker {
    pub fn new(store: Arc<dyn PreviewStore>) -> Self {
        Self {
            store,
            buckets: HashMap::new(),
            owners: HashMap::new(),
            released: HashSet::new(),
        }
    }

    /// Allocates a preview for `file` and tracks it under `bucket`.
    pub fn allocate(&mut self, bucket: &str, file: &OutgoingFile) -> LocalHandle {
        let handle = self.store.allocate(file);
        self.track(bucket, handle)
    }

    pub fn track(&mut self, bucket: &str, handle: LocalHandle) -> LocalHandle {
        if let Some(previous) = self.owners.insert(handle, bucket.to_string()) {
            if previous != bucket {
                self.detach(&previous, handle);
            } else {
                return handle;
            }
        }
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .push(handle);
        handle
    }

    /// Returns `true` only for the call that actually revoked the handle.
    pub fn release(&mut self, handle: LocalHandle) -> bool {
        if let Some(bucket) = self.owners.remove(&handle) {
            self.detach(&bucket, handle);
        }
        if !self.released.insert(handle) {
            return false;
        }
        self.store.revoke(handle);
        true
    }

    pub fn release_bucket(&mut self, bucket: &str) -> usize {
        let Some(handles) = self.buckets.remove(bucket) else {
            return 0;
        };
        let mut revoked = 0;
        for handle in handles {
            self.owners.remove(&handle);
            if self.released.insert(handle) {
                self.store.revoke(handle);
                revoked += 1;
            }
        }
        debug!(bucket, revoked, "resources: released bucket");
        revoked
    }

    pub fn release_all(&mut self) -> usize {
        let buckets = self.buckets.keys().cloned().collect::<Vec<_>>();
        buckets
            .iter()
            .map(|bucket| self.release_bucket(bucket))
            .sum()
    }

    pub fn is_tracked(&self, handle: LocalHandle) -> bool {
        self.owners.contains_key(&handle)
    }

    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map_or(0, Vec::len)
    }

    pub fn tracked_count(&self) -> usize {
        self.owners.len()
    }

    fn detach(&mut self, bucket: &str, handle: LocalHandle) {
        let now_empty = match self.buckets.get_mut(bucket) {
            Some(handles) => {
                handles.retain(|candidate| *candidate != handle);
                handles.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.buckets.remove(bucket);
        }
    }
}

#[cfg(test)]
#[path = "tests/resources_tests.rs"]
mod tests;
