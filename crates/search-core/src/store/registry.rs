use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Weak};

use fnv::FnvHashMap;
use parking_lot::Mutex;

use super::{Store, StoreBackend, StoreKey, StoreShared};

static REGISTRY: LazyLock<ObjectRegistry> = LazyLock::new(ObjectRegistry::new);

struct RegistryEntry {
    id: u64,
    shared: Weak<StoreShared>,
}

/// Process-wide weak map from store identity to the live store.
///
/// The registry never keeps a store alive. Stores remove their own entry
/// when they are torn down.
pub struct ObjectRegistry {
    entries: Mutex<FnvHashMap<StoreKey, RegistryEntry>>,
    next_id: AtomicU64,
}

impl ObjectRegistry {
    fn new() -> Self {
        Self {
            entries: Mutex::new(FnvHashMap::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn global() -> &'static ObjectRegistry {
        &REGISTRY
    }

    /// Returns the live store registered under `key`.
    pub fn lookup(&self, key: &StoreKey) -> Option<Store> {
        let entries = self.entries.lock();
        let shared = entries.get(key)?.shared.upgrade()?;
        Some(Store { shared })
    }

    /// Number of live stores.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.shared.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the store for `key`, creating it from `backend` if no live
    /// store is registered. The flag is true when a new store was created.
    pub(super) fn get_or_insert_with<F>(&self, key: StoreKey, backend: F) -> (Store, bool)
    where
        F: FnOnce() -> Box<dyn StoreBackend>,
    {
        // Upgraded handles must leave this function alive: dropping the last
        // one here would re-enter the registry lock from `StoreShared::drop`.
        let mut entries = self.entries.lock();
        if let Some(shared) = entries.get(&key).and_then(|entry| entry.shared.upgrade()) {
            return (Store { shared }, false);
        }

        entries.retain(|_, entry| entry.shared.strong_count() > 0);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(StoreShared::new(id, key.clone(), backend()));
        entries.insert(
            key,
            RegistryEntry {
                id,
                shared: Arc::downgrade(&shared),
            },
        );
        (Store { shared }, true)
    }

    /// Registers a store whose key is derived from a fresh id.
    pub(super) fn insert_new<F>(&self, make: F) -> Store
    where
        F: FnOnce(u64) -> (StoreKey, Box<dyn StoreBackend>),
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (key, backend) = make(id);
        let shared = Arc::new(StoreShared::new(id, key.clone(), backend));

        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.shared.strong_count() > 0);
        entries.insert(
            key,
            RegistryEntry {
                id,
                shared: Arc::downgrade(&shared),
            },
        );
        Store { shared }
    }

    /// Drops the entry for `key` if it still belongs to store `id`.
    pub(super) fn remove(&self, key: &StoreKey, id: u64) {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.id == id) {
            entries.remove(key);
        }
    }
}

/// Number of live stores in the process-wide registry.
pub fn registry_len() -> usize {
    ObjectRegistry::global().len()
}
