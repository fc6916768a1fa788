use parking_lot::RwLock;
use std::sync::Arc;

/// Latest complete snapshot of a list of summaries
///
/// The list is only ever replaced whole. Readers get their own copy.
#[derive(Debug)]
pub struct SnapshotStore<T> {
    items: RwLock<Arc<Vec<T>>>,
}

impl<T: Clone> SnapshotStore<T> {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Swap in a new snapshot
    pub fn replace(&self, items: Vec<T>) {
        let previous = std::mem::replace(&mut *self.items.write(), Arc::new(items));
        // Free the old list after the write lock is released
        drop(previous);
    }

    /// Copy of the current snapshot
    pub fn list(&self) -> Vec<T> {
        // Clone the Arc under the lock, copy the items outside it
        let current = Arc::clone(&*self.items.read());
        current.as_ref().clone()
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl<T: Clone> Default for SnapshotStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
