use std::{
    any::Any,
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Token handed to native callers in place of an object reference.
pub type Handle = isize;

/// Handle value native callers treat as "invalid".
pub const INVALID_HANDLE: Handle = -1;

type Object = Arc<dyn Any + Send + Sync>;

struct Entry {
    object: Object,
    ref_count: u32,
}

#[derive(Default)]
struct Inner {
    last: Handle,
    entries: HashMap<Handle, Entry>,
}

/// Maps native handles to owned objects. Every access takes the one mutex.
#[derive(Default)]
pub struct HandleTable {
    inner: Mutex<Inner>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `object` under a fresh handle. Handles are never reused.
    pub fn add(&self, object: Object) -> Handle {
        let mut inner = self.lock();
        inner.last += 1;
        let handle = inner.last;
        inner.entries.insert(
            handle,
            Entry {
                object,
                ref_count: 1,
            },
        );
        handle
    }

    /// Stores `object` under a caller-chosen handle (used when re-registering
    /// objects after a reload). Returns false if the handle is taken.
    pub fn add_at(&self, handle: Handle, object: Object) -> bool {
        let mut inner = self.lock();
        if inner.entries.contains_key(&handle) {
            return false;
        }
        inner.last = inner.last.max(handle);
        inner.entries.insert(
            handle,
            Entry {
                object,
                ref_count: 1,
            },
        );
        true
    }

    pub fn get(&self, handle: Handle) -> Option<Object> {
        self.lock()
            .entries
            .get(&handle)
            .map(|entry| Arc::clone(&entry.object))
    }

    pub fn get_as<T: Any + Send + Sync>(&self, handle: Handle) -> Option<Arc<T>> {
        self.get(handle)?.downcast::<T>().ok()
    }

    /// Replaces the object behind `handle` and bumps its reference count.
    pub fn update(&self, handle: Handle, object: Object) -> bool {
        match self.lock().entries.get_mut(&handle) {
            Some(entry) => {
                entry.object = object;
                entry.ref_count += 1;
                true
            }
            None => false,
        }
    }

    pub fn ref_count(&self, handle: Handle) -> Option<u32> {
        self.lock().entries.get(&handle).map(|entry| entry.ref_count)
    }

    /// Drops the entry, returning its reference count; `None` if it was never added.
    pub fn remove(&self, handle: Handle) -> Option<u32> {
        self.lock()
            .entries
            .remove(&handle)
            .map(|entry| entry.ref_count)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
