use std::thread;
use std::time::{Duration, Instant};

use super::Store;
use crate::error::{EngineError, Result};

/// Timeout used by callers that have no better value.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(1);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A named lock bound to one store.
///
/// Lock state belongs to the `(store, name)` pair: every `Lock` opened with
/// the same name through the same store observes the same state. Dropping a
/// `Lock` does not release it; the store releases locks still held when it
/// is torn down.
#[derive(Debug, Clone)]
pub struct Lock {
    store: Store,
    name: String,
}

impl Lock {
    pub(super) fn new(store: Store, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Tries to acquire the lock, polling until `timeout` elapses.
    ///
    /// Returns `Ok(false)` if the lock is still held elsewhere when time runs
    /// out. At least one attempt is made even for a zero timeout. The
    /// timeout is honored to within one poll interval; a timeout too large
    /// to represent as a deadline waits indefinitely.
    pub fn obtain(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            match self.try_obtain() {
                Ok(true) => {
                    log::debug!(
                        "lock obtained store={} lock={}",
                        self.store.key(),
                        self.name
                    );
                    return Ok(true);
                }
                Ok(false) => {}
                Err(error) => {
                    return Err(EngineError::LockObtainFailed {
                        name: self.name.clone(),
                        reason: error.to_string(),
                    })
                }
            }

            let now = Instant::now();
            let Some(deadline) = deadline else {
                thread::sleep(LOCK_POLL_INTERVAL);
                continue;
            };
            if now >= deadline {
                log::debug!(
                    "lock obtain timed out store={} lock={} timeout_ms={}",
                    self.store.key(),
                    self.name,
                    timeout.as_millis()
                );
                return Ok(false);
            }
            thread::sleep(LOCK_POLL_INTERVAL.min(deadline - now));
        }
    }

    fn try_obtain(&self) -> Result<bool> {
        let mut held = self.store.held().lock();
        if held.contains(&self.name) {
            return Ok(false);
        }
        if !self.store.backend().create_lock_marker(&self.name)? {
            return Ok(false);
        }
        held.insert(self.name.clone());
        Ok(true)
    }

    /// Releases the lock if this store holds it. Otherwise does nothing.
    pub fn release(&self) -> Result<()> {
        let mut held = self.store.held().lock();
        if !held.contains(&self.name) {
            return Ok(());
        }
        self.store.backend().remove_lock_marker(&self.name)?;
        held.remove(&self.name);
        log::debug!(
            "lock released store={} lock={}",
            self.store.key(),
            self.name
        );
        Ok(())
    }

    /// Whether the lock is currently held by anyone.
    ///
    /// For directory stores this reads the marker file and is advisory.
    pub fn is_locked(&self) -> Result<bool> {
        self.store.backend().lock_marker_exists(&self.name)
    }

    /// Runs `body` while holding the lock.
    ///
    /// Fails with [`EngineError::LockObtainFailed`] if the lock cannot be
    /// obtained within `timeout`. The lock is released when `body` returns
    /// or unwinds.
    pub fn with_lock<R>(&self, timeout: Duration, body: impl FnOnce() -> R) -> Result<R> {
        if !self.obtain(timeout)? {
            return Err(EngineError::LockObtainFailed {
                name: self.name.clone(),
                reason: format!("timed out after {}ms", timeout.as_millis()),
            });
        }

        let _release = scopeguard::guard((), |_| {
            if let Err(error) = self.release() {
                log::warn!(
                    "lock release failed store={} lock={} error={error}",
                    self.store.key(),
                    self.name
                );
            }
        });
        Ok(body())
    }
}
