use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{
    is_lock_marker_name, ObjectRegistry, Store, StoreBackend, StoreKey, LOCK_MARKER_PREFIX,
    LOCK_MARKER_SUFFIX,
};
use crate::error::{EngineError, Result};

/// Directory-backed store.
pub struct FsStore;

impl FsStore {
    /// Opens the store rooted at `path`.
    ///
    /// With `create`, the directory tree is created if missing and every
    /// existing entry is removed. Without it, `path` must already be a
    /// directory. Opens that resolve to the same canonical path share one
    /// store.
    pub fn open(path: impl AsRef<Path>, create: bool) -> Result<Store> {
        let path = path.as_ref();
        if create {
            match fs::create_dir_all(path) {
                Ok(()) => {}
                Err(_) if path.exists() && !path.is_dir() => {
                    return Err(EngineError::DirectoryNotFound(path.to_path_buf()));
                }
                Err(error) => return Err(error.into()),
            }
        }
        if !path.is_dir() {
            return Err(EngineError::DirectoryNotFound(path.to_path_buf()));
        }

        let root = fs::canonicalize(path)?;
        let (store, created) = ObjectRegistry::global()
            .get_or_insert_with(StoreKey::Fs(root.clone()), || -> Box<dyn StoreBackend> {
                Box::new(FsBackend { root })
            });
        if create {
            store.clear_all()?;
        }

        log::info!(
            "store opened backend=fs key={} create={create} shared={}",
            store.key(),
            !created
        );
        Ok(store)
    }
}

#[derive(Debug)]
struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    fn entry_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn marker_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{LOCK_MARKER_PREFIX}{name}{LOCK_MARKER_SUFFIX}"))
    }

    fn not_found(&self, name: &str) -> EngineError {
        EngineError::NotFound(format!(
            "no entry named {name:?} in {}",
            self.root.display()
        ))
    }

    /// Lists regular files, split into entries and lock markers.
    fn scan(&self) -> Result<(Vec<String>, Vec<String>)> {
        let mut entries = Vec::new();
        let mut markers = Vec::new();
        for dir_entry in fs::read_dir(&self.root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let Ok(name) = dir_entry.file_name().into_string() else {
                continue;
            };
            if is_lock_marker_name(&name) {
                markers.push(name);
            } else {
                entries.push(name);
            }
        }
        entries.sort();
        Ok((entries, markers))
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}

impl StoreBackend for FsBackend {
    fn exists(&self, name: &str) -> Result<bool> {
        match fs::metadata(self.entry_path(name)) {
            Ok(metadata) => Ok(metadata.is_file()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn touch(&self, name: &str) -> Result<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.entry_path(name))?;
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<bool> {
        remove_if_present(&self.entry_path(name))
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        if !self.exists(from)? {
            return Err(self.not_found(from));
        }
        fs::rename(self.entry_path(from), self.entry_path(to))?;
        Ok(())
    }

    fn file_names(&self) -> Result<Vec<String>> {
        Ok(self.scan()?.0)
    }

    fn clear_all(&self) -> Result<()> {
        for name in self.file_names()? {
            remove_if_present(&self.entry_path(&name))?;
        }
        Ok(())
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        match fs::read(self.entry_path(name)) {
            Ok(data) => Ok(data),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(self.not_found(name)),
            Err(error) => Err(error.into()),
        }
    }

    fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        fs::write(self.entry_path(name), data)?;
        Ok(())
    }

    fn file_len(&self, name: &str) -> Result<u64> {
        match fs::metadata(self.entry_path(name)) {
            Ok(metadata) => Ok(metadata.len()),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(self.not_found(name)),
            Err(error) => Err(error.into()),
        }
    }

    fn create_lock_marker(&self, name: &str) -> Result<bool> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker_path(name))
        {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(error) => return Err(error.into()),
        };
        writeln!(
            file,
            "{}\n{}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        )?;
        Ok(true)
    }

    fn lock_marker_exists(&self, name: &str) -> Result<bool> {
        Ok(self.marker_path(name).is_file())
    }

    fn remove_lock_marker(&self, name: &str) -> Result<()> {
        remove_if_present(&self.marker_path(name))?;
        Ok(())
    }

    fn clear_lock_markers(&self) -> Result<usize> {
        let (_, markers) = self.scan()?;
        let mut removed = 0;
        for name in markers {
            if remove_if_present(&self.root.join(name))? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_without_create_requires_directory() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("missing");

        let error = FsStore::open(&missing, false).expect_err("missing dir");
        assert!(matches!(error, EngineError::DirectoryNotFound(path) if path == missing));

        let file = dir.path().join("plain-file");
        fs::write(&file, b"x").expect("write file");
        assert!(matches!(
            FsStore::open(&file, false),
            Err(EngineError::DirectoryNotFound(_))
        ));
        assert!(matches!(
            FsStore::open(&file, true),
            Err(EngineError::DirectoryNotFound(_))
        ));
        assert_eq!(fs::read(&file).expect("file untouched"), b"x");
    }

    #[test]
    fn open_with_create_builds_tree_and_starts_fresh() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("a").join("b");

        let store = FsStore::open(&root, true).expect("create");
        store.write("segments", b"1").expect("write");
        drop(store);

        let reopened = FsStore::open(&root, false).expect("reopen");
        assert!(reopened.exists("segments").expect("exists"));
        drop(reopened);

        let fresh = FsStore::open(&root, true).expect("recreate");
        assert_eq!(fresh.file_count().expect("count"), 0);
    }

    #[test]
    fn opens_of_same_canonical_path_share_store() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");

        let first = FsStore::open(dir.path(), false).expect("open");
        let second = FsStore::open(dir.path().join("sub").join(".."), false).expect("open");
        assert!(first.same_store(&second));
        assert_eq!(
            Store::lookup(first.key()).map(|store| store.same_store(&first)),
            Some(true)
        );
    }

    #[test]
    fn entries_round_trip_through_disk() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsStore::open(dir.path(), true).expect("open");

        store.write("_0.cfs", b"payload").expect("write");
        store.touch("_0.cfs").expect("touch");
        store.touch("deletable").expect("touch");

        assert_eq!(fs::read(dir.path().join("_0.cfs")).expect("disk"), b"payload");
        assert_eq!(store.file_len("_0.cfs").expect("len"), 7);
        assert_eq!(store.file_names().expect("names"), vec!["_0.cfs", "deletable"]);

        assert!(store.remove("deletable").expect("remove"));
        assert!(!store.remove("deletable").expect("remove again"));
        assert!(matches!(store.read("deletable"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn rename_overwrites_and_reports_missing_source() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsStore::open(dir.path(), true).expect("open");
        store.write("segments.new", b"2").expect("write");
        store.write("segments", b"1").expect("write");

        store.rename("segments.new", "segments").expect("rename");
        assert_eq!(store.read("segments").expect("read"), b"2");
        assert!(!store.exists("segments.new").expect("exists"));

        let error = store.rename("segments.new", "x").expect_err("missing");
        assert!(matches!(error, EngineError::NotFound(_)));
    }

    #[test]
    fn lock_markers_are_not_entries() {
        let dir = TempDir::new().expect("tempdir");
        let store = FsStore::open(dir.path(), true).expect("open");
        store.touch("a").expect("touch");

        let lock = store.open_lock("write").expect("lock");
        assert!(lock.obtain(std::time::Duration::ZERO).expect("obtain"));

        let marker = dir.path().join("lock-write.lck");
        let contents = fs::read_to_string(&marker).expect("marker");
        assert_eq!(
            contents.lines().next(),
            Some(std::process::id().to_string().as_str())
        );

        assert_eq!(store.file_count().expect("count"), 1);
        store.clear_all().expect("clear");
        assert_eq!(store.file_count().expect("count"), 0);
        assert!(marker.exists());
        lock.release().expect("release");
        assert!(!marker.exists());
    }

    #[test]
    fn ignores_subdirectories() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir(dir.path().join("nested")).expect("mkdir");
        let store = FsStore::open(dir.path(), false).expect("open");
        assert_eq!(store.file_count().expect("count"), 0);
        assert!(!store.exists("nested").expect("exists"));
    }
}
