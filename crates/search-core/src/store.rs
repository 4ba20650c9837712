//! Named-entry stores and the locks that guard them.
//!
//! A [`Store`] is a cheap, cloneable handle to shared backend state. Handles
//! for the same physical resource are deduplicated through the process-wide
//! [`ObjectRegistry`], so two opens of one directory share contents and lock
//! state. The backing state is torn down when the last handle (including any
//! [`Lock`] bound to it) is dropped; locks still held at that point are
//! released.

mod fs;
mod lock;
mod ram;
mod registry;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use fnv::FnvHashSet;
use parking_lot::Mutex;

use crate::error::{validate_entry_name, EngineError, Result};

pub use fs::FsStore;
pub use lock::{Lock, DEFAULT_LOCK_TIMEOUT};
pub use ram::RamStore;
pub use registry::{registry_len, ObjectRegistry};

/// Identity of a store's backing resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// In-memory store, identified by its registry id.
    Ram(u64),
    /// Directory store, identified by its canonical path.
    Fs(PathBuf),
}

impl StoreKey {
    pub fn kind(&self) -> StoreKind {
        match self {
            StoreKey::Ram(_) => StoreKind::Ram,
            StoreKey::Fs(_) => StoreKind::Fs,
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKey::Ram(id) => write!(f, "ram:{id}"),
            StoreKey::Fs(path) => write!(f, "fs:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Ram,
    Fs,
}

/// Backend operations. Names are validated before they reach a backend.
///
/// Lock markers live beside entries but are never reported as entries.
pub(crate) trait StoreBackend: Send + Sync + fmt::Debug {
    fn exists(&self, name: &str) -> Result<bool>;
    fn touch(&self, name: &str) -> Result<()>;
    fn remove(&self, name: &str) -> Result<bool>;
    fn rename(&self, from: &str, to: &str) -> Result<()>;
    /// Entry names in sorted order.
    fn file_names(&self) -> Result<Vec<String>>;
    fn file_count(&self) -> Result<usize> {
        Ok(self.file_names()?.len())
    }
    fn clear_all(&self) -> Result<()>;
    fn read(&self, name: &str) -> Result<Vec<u8>>;
    fn write(&self, name: &str, data: &[u8]) -> Result<()>;
    fn file_len(&self, name: &str) -> Result<u64>;

    /// Creates the marker for `name`. Returns false if it already exists.
    fn create_lock_marker(&self, name: &str) -> Result<bool>;
    fn lock_marker_exists(&self, name: &str) -> Result<bool>;
    fn remove_lock_marker(&self, name: &str) -> Result<()>;
    /// Removes every marker and returns how many were removed.
    fn clear_lock_markers(&self) -> Result<usize>;
}

/// State shared by every handle of one store.
struct StoreShared {
    /// Registry id; distinguishes this store from a later one under the
    /// same key.
    id: u64,
    key: StoreKey,
    backend: Box<dyn StoreBackend>,
    /// Lock names held through this store.
    held: Mutex<FnvHashSet<String>>,
}

impl StoreShared {
    fn new(id: u64, key: StoreKey, backend: Box<dyn StoreBackend>) -> Self {
        Self {
            id,
            key,
            backend,
            held: Mutex::new(FnvHashSet::default()),
        }
    }
}

impl Drop for StoreShared {
    fn drop(&mut self) {
        let held = std::mem::take(self.held.get_mut());
        for name in held {
            match self.backend.remove_lock_marker(&name) {
                Ok(()) => log::warn!(
                    "store teardown released orphaned lock key={} lock={name}",
                    self.key
                ),
                Err(error) => log::warn!(
                    "store teardown failed to release lock key={} lock={name} error={error}",
                    self.key
                ),
            }
        }
        ObjectRegistry::global().remove(&self.key, self.id);
        log::debug!("store closed key={}", self.key);
    }
}

/// Handle to a store. Clones share the same backing state.
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("key", &self.shared.key)
            .field("backend", &self.shared.backend)
            .finish()
    }
}

impl Store {
    pub fn exists(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        self.shared.backend.exists(name)
    }

    /// Creates an empty entry if absent. Existing contents are kept.
    pub fn touch(&self, name: &str) -> Result<()> {
        validate_name(name)?;
        self.shared.backend.touch(name)
    }

    /// Deletes an entry. Returns false if it did not exist.
    pub fn remove(&self, name: &str) -> Result<bool> {
        validate_name(name)?;
        self.shared.backend.remove(name)
    }

    /// Renames `from` to `to`, replacing any existing `to`.
    ///
    /// Fails with [`EngineError::NotFound`] when `from` is absent. The
    /// replacement is best-effort and not guaranteed to be crash-atomic.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        validate_name(from)?;
        validate_name(to)?;
        self.shared.backend.rename(from, to)
    }

    pub fn file_count(&self) -> Result<usize> {
        self.shared.backend.file_count()
    }

    /// Returns entry names in sorted order.
    pub fn file_names(&self) -> Result<Vec<String>> {
        self.shared.backend.file_names()
    }

    /// Removes every entry. Lock markers are left alone.
    pub fn clear_all(&self) -> Result<()> {
        self.shared.backend.clear_all()
    }

    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        validate_name(name)?;
        self.shared.backend.read(name)
    }

    /// Writes `data` to `name`, replacing any previous contents.
    pub fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_name(name)?;
        self.shared.backend.write(name, data)
    }

    pub fn file_len(&self, name: &str) -> Result<u64> {
        validate_name(name)?;
        self.shared.backend.file_len(name)
    }

    /// Returns a lock bound to this store. The lock is not acquired.
    pub fn open_lock(&self, name: &str) -> Result<Lock> {
        validate_name(name)?;
        Ok(Lock::new(self.clone(), name))
    }

    /// Removes every lock marker, including stale ones left by processes
    /// that exited while holding a lock.
    pub fn clear_locks(&self) -> Result<()> {
        let mut held = self.shared.held.lock();
        let removed = self.shared.backend.clear_lock_markers()?;
        held.clear();
        log::info!("store locks cleared key={} removed={removed}", self.shared.key);
        Ok(())
    }

    pub fn key(&self) -> &StoreKey {
        &self.shared.key
    }

    pub fn kind(&self) -> StoreKind {
        self.shared.key.kind()
    }

    /// Returns true when both handles refer to the same logical store.
    pub fn same_store(&self, other: &Store) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Finds a live store by key.
    pub fn lookup(key: &StoreKey) -> Option<Store> {
        ObjectRegistry::global().lookup(key)
    }

    /// Releases this handle. The store stays open while other handles or
    /// locks reference it.
    pub fn close(self) {
        log::debug!(
            "store handle closed key={} remaining={}",
            self.shared.key,
            Arc::strong_count(&self.shared) - 1
        );
    }

    fn backend(&self) -> &dyn StoreBackend {
        self.shared.backend.as_ref()
    }

    fn held(&self) -> &Mutex<FnvHashSet<String>> {
        &self.shared.held
    }
}

const LOCK_MARKER_PREFIX: &str = "lock-";
const LOCK_MARKER_SUFFIX: &str = ".lck";

fn is_lock_marker_name(name: &str) -> bool {
    name.starts_with(LOCK_MARKER_PREFIX) && name.ends_with(LOCK_MARKER_SUFFIX)
}

/// Entry and lock names: plain file names that cannot be mistaken for lock
/// markers.
fn validate_name(name: &str) -> Result<()> {
    validate_entry_name(name)?;
    if is_lock_marker_name(name) {
        return Err(EngineError::InvalidInput(format!(
            "entry name {name:?} is reserved for lock markers"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_reserved_and_nested_names() {
        let store = RamStore::open_empty();
        assert!(matches!(
            store.touch("lock-write.lck"),
            Err(EngineError::InvalidInput(_))
        ));
        assert!(matches!(store.write("a/b", b"x"), Err(EngineError::InvalidInput(_))));
        assert!(store.open_lock("").is_err());
    }

    #[test]
    fn clones_share_state() {
        let store = RamStore::open_empty();
        let clone = store.clone();
        store.write("segments", b"1").expect("write");
        assert!(clone.exists("segments").expect("exists"));
        assert!(store.same_store(&clone));
        assert!(!store.same_store(&RamStore::open_empty()));
    }

    #[test]
    fn key_display_names_backend() {
        assert_eq!(StoreKey::Ram(7).to_string(), "ram:7");
        assert_eq!(StoreKey::Fs(PathBuf::from("/idx")).kind(), StoreKind::Fs);
    }
}
