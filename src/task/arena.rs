//! Request-scoped typed key-value store.
//!
//! Per-message state (the cached per-user string, the runtime table) lives
//! here instead of being threaded through every call. Ownership of a value
//! transfers on insertion and everything is released together when the task
//! is dropped at the end of the request, so none of the consumers have to do
//! lifetime bookkeeping of their own.

use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Slot = Arc<dyn Any + Send + Sync>;

/// Typed key-value store scoped to one request.
#[derive(Default)]
pub struct Arena {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by key, downcasting to the requested type.
    ///
    /// Returns `None` when the key is absent or holds a value of a different
    /// type.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        let slots = self.slots.lock();
        slots.get(key).cloned()?.downcast::<T>().ok()
    }

    /// Store a value under `key`, replacing any previous entry.
    pub fn set<T: Any + Send + Sync>(&self, key: &str, value: Arc<T>) {
        let mut slots = self.slots.lock();
        slots.insert(key.to_string(), value);
    }

    /// Fetch the value under `key`, inserting the result of `init` first if
    /// the key is absent.
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let mut slots = self.slots.lock();
        if let Some(existing) = slots.get(key).cloned().and_then(|slot| slot.downcast::<T>().ok()) {
            return existing;
        }

        let value = Arc::new(init());
        slots.insert(key.to_string(), value.clone() as Slot);
        value
    }

    /// Number of live entries, mostly useful for tests and debug logging.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
