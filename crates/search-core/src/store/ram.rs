use fnv::{FnvHashMap, FnvHashSet};
use parking_lot::{Mutex, RwLock};

use super::{ObjectRegistry, Store, StoreBackend, StoreKey};
use crate::error::{EngineError, Result};

/// In-process store.
pub struct RamStore;

impl RamStore {
    pub fn open_empty() -> Store {
        Self::open_with(FnvHashMap::default())
    }

    /// Opens a new store holding a deep copy of every entry in `source`.
    ///
    /// `source` stays open and independent of the copy. Lock state is not
    /// copied.
    pub fn open_copy(source: &Store) -> Result<Store> {
        let mut entries = FnvHashMap::default();
        for name in source.file_names()? {
            let data = source.read(&name)?;
            entries.insert(name, data);
        }
        let copy = Self::open_with(entries);
        log::debug!(
            "ram store copied source={} copy={}",
            source.key(),
            copy.key()
        );
        Ok(copy)
    }

    /// Like [`RamStore::open_copy`], but closes `source` once copied.
    pub fn open_copy_owned(source: Store) -> Result<Store> {
        let copy = Self::open_copy(&source)?;
        source.close();
        Ok(copy)
    }

    fn open_with(entries: FnvHashMap<String, Vec<u8>>) -> Store {
        let store = ObjectRegistry::global().insert_new(|id| {
            let backend: Box<dyn StoreBackend> = Box::new(RamBackend {
                entries: RwLock::new(entries),
                markers: Mutex::new(FnvHashSet::default()),
            });
            (StoreKey::Ram(id), backend)
        });
        log::debug!("store opened backend=ram key={}", store.key());
        store
    }
}

#[derive(Debug)]
struct RamBackend {
    entries: RwLock<FnvHashMap<String, Vec<u8>>>,
    markers: Mutex<FnvHashSet<String>>,
}

fn not_found(name: &str) -> EngineError {
    EngineError::NotFound(format!("no entry named {name:?}"))
}

impl StoreBackend for RamBackend {
    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.entries.read().contains_key(name))
    }

    fn touch(&self, name: &str) -> Result<()> {
        self.entries.write().entry(name.to_string()).or_default();
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        Ok(self.entries.write().remove(name).is_some())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut entries = self.entries.write();
        let data = entries.remove(from).ok_or_else(|| not_found(from))?;
        entries.insert(to.to_string(), data);
        Ok(())
    }

    fn file_names(&self) -> Result<Vec<String>> {
        let mut names = self.entries.read().keys().cloned().collect::<Vec<_>>();
        names.sort();
        Ok(names)
    }

    fn file_count(&self) -> Result<usize> {
        Ok(self.entries.read().len())
    }

    fn clear_all(&self) -> Result<()> {
        self.entries.write().clear();
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.entries
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        self.entries.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        self.entries
            .read()
            .get(name)
            .map(|data| data.len() as u64)
            .ok_or_else(|| not_found(name))
    }

    fn create_lock_marker(&self, name: &str) -> Result<bool> {
        Ok(self.markers.lock().insert(name.to_string()))
    }

    fn lock_marker_exists(&self, name: &str) -> Result<bool> {
        Ok(self.markers.lock().contains(name))
    }

    fn remove_lock_marker(&self, name: &str) -> Result<()> {
        self.markers.lock().remove(name);
        Ok(())
    }

    fn clear_lock_markers(&self) -> Result<usize> {
        let mut markers = self.markers.lock();
        let removed = markers.len();
        markers.clear();
        Ok(removed)
    }
}
