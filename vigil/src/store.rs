//! Handle-to-state registries.
//!
//! One registry exists per object kind, device-wide. Readers take a stable
//! `Arc` snapshot of the state object under a short shared lock, so a lookup
//! for image X never blocks on an insertion for image Y beyond the map lock
//! itself, and destruction of an object is safe while a validation read on
//! its snapshot is still in flight.

use foldhash::HashMap;
use parking_lot::RwLock;
use std::{hash::Hash, sync::Arc};

pub struct Registry<H, T> {
    map: RwLock<HashMap<H, Arc<T>>>,
}

impl<H: Copy + Eq + Hash, T> Registry<H, T> {
    pub fn new() -> Self {
        Registry {
            map: RwLock::new(HashMap::default()),
        }
    }

    pub fn insert(&self, handle: H, state: Arc<T>) {
        self.map.write().insert(handle, state);
    }

    /// Returns a snapshot of the state for `handle`, or `None` if the object
    /// was destroyed or never created. Callers treat `None` as "skip
    /// validation for this reference"; a separate existence-check layer
    /// reports the real error.
    pub fn get(&self, handle: H) -> Option<Arc<T>> {
        self.map.read().get(&handle).cloned()
    }

    pub fn remove(&self, handle: H) -> Option<Arc<T>> {
        self.map.write().remove(&handle)
    }

    pub fn len(&self) -> usize {
        self.map.read().len()
    }
}

impl<H: Copy + Eq + Hash, T> Default for Registry<H, T> {
    fn default() -> Self {
        Self::new()
    }
}
