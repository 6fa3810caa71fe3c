use std::any::Any;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::Mutex;

use super::trie::Trie;

/// Handle to a value read out of a [`TrieStore`]. It keeps the snapshot it
/// was read from alive, so the value stays valid however the store moves on.
pub struct ValueGuard<T> {
    _root: Trie,
    value: Arc<dyn Any + Send + Sync>,
    _marker: PhantomData<T>,
}

impl<T: Any + Send + Sync> ValueGuard<T> {
    fn new(root: Trie, value: Arc<dyn Any + Send + Sync>) -> Self {
        debug_assert!(value.is::<T>());
        Self {
            _root: root,
            value,
            _marker: PhantomData,
        }
    }

    pub fn value(&self) -> &T {
        self.value.downcast_ref::<T>().expect("checked at creation")
    }
}

impl<T: Any + Send + Sync> Deref for ValueGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value()
    }
}

/// Thread-safe wrapper around an immutable [`Trie`].
///
/// Readers take the root latch only long enough to copy the current root
/// and then search their private snapshot. Writers serialize on the writer
/// latch, compute the new trie outside both latches, and publish it under
/// the root latch.
#[derive(Default)]
pub struct TrieStore {
    /// Guards reads and replacements of the root handle; held briefly
    root: Mutex<Trie>,
    /// Serializes writers; never held by readers
    write_lock: Mutex<()>,
}

impl TrieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key` in the current snapshot. The returned guard pins the
    /// snapshot, so concurrent writers cannot invalidate the value.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<ValueGuard<T>> {
        let snapshot = { self.root.lock().clone() };

        let handle = snapshot.get_handle(key)?.clone();
        if !handle.is::<T>() {
            return None;
        }
        Some(ValueGuard::new(snapshot, handle))
    }

    /// Maps `key` to `value`, replacing any previous value.
    pub fn put<T: Any + Send + Sync>(&self, key: &str, value: T) {
        let _writer = self.write_lock.lock();

        let snapshot = { self.root.lock().clone() };
        let updated = snapshot.put(key, value);
        *self.root.lock() = updated;
    }

    /// Removes `key` if present.
    pub fn remove(&self, key: &str) {
        let _writer = self.write_lock.lock();

        let snapshot = { self.root.lock().clone() };
        let updated = snapshot.remove(key);
        *self.root.lock() = updated;
    }
}
