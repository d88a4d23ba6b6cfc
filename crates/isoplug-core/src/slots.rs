use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    thread::{self, ThreadId},
};

use uuid::Uuid;

use crate::error::RelayError;

struct Inner<T> {
    /// Plugin id posted by each thread that has an event pending.
    callers: HashMap<ThreadId, Uuid>,
    cells: HashMap<(Uuid, String), Option<T>>,
}

/// Named single-writer/single-reader cells carrying one event payload per
/// plugin across a context boundary.
pub struct SlotStore<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for SlotStore<T> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                callers: HashMap::new(),
                cells: HashMap::new(),
            }),
        }
    }
}

impl<T> SlotStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Posts `payload` for `plugin` and records the calling thread as its owner.
    ///
    /// Fails if the same plugin already has an event pending on `buffer`.
    pub fn begin(&self, plugin: Uuid, buffer: &str, payload: T) -> Result<(), RelayError> {
        let mut inner = self.lock();
        let key = (plugin, buffer.to_string());
        if inner.cells.contains_key(&key) {
            return Err(RelayError::EventInFlight {
                plugin,
                buffer: buffer.to_string(),
            });
        }
        inner.cells.insert(key, Some(payload));
        inner.callers.insert(thread::current().id(), plugin);
        Ok(())
    }

    /// Plugin id posted by the current thread, consumed on read.
    pub fn take_caller(&self) -> Option<Uuid> {
        self.lock().callers.remove(&thread::current().id())
    }

    pub fn read(&self, plugin: Uuid, buffer: &str) -> Option<T> {
        self.lock()
            .cells
            .get_mut(&(plugin, buffer.to_string()))
            .and_then(Option::take)
    }

    pub fn write_back(&self, plugin: Uuid, buffer: &str, payload: T) {
        if let Some(cell) = self.lock().cells.get_mut(&(plugin, buffer.to_string())) {
            *cell = Some(payload);
        }
    }

    /// Releases the cell and returns whatever payload it holds.
    pub fn finish(&self, plugin: Uuid, buffer: &str) -> Option<T> {
        let mut inner = self.lock();
        let current = thread::current().id();
        if inner.callers.get(&current) == Some(&plugin) {
            inner.callers.remove(&current);
        }
        inner.cells.remove(&(plugin, buffer.to_string())).flatten()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().cells.len()
    }
}
