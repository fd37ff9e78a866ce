use std::cell::{Cell, RefCell};

use prefsync_core::PrefMap;
use prefsync_storage::{PreferenceRepository, SqliteRepository, StorageError};

/// In-memory daemon stand-in that records calls and can be told to fail.
pub struct TestDaemon {
    inner: SqliteRepository,
    fail_fetch: Cell<bool>,
    fail_write: Cell<bool>,
    fail_reset: Cell<bool>,
    stall_write: Cell<bool>,
    stall_reset: Cell<bool>,
    fetch_calls: Cell<usize>,
    reset_calls: Cell<usize>,
    writes: RefCell<Vec<PrefMap>>,
}

impl TestDaemon {
    pub fn new() -> Result<Self, StorageError> {
        Ok(Self {
            inner: SqliteRepository::open_in_memory()?,
            fail_fetch: Cell::new(false),
            fail_write: Cell::new(false),
            fail_reset: Cell::new(false),
            stall_write: Cell::new(false),
            stall_reset: Cell::new(false),
            fetch_calls: Cell::new(0),
            reset_calls: Cell::new(0),
            writes: RefCell::new(Vec::new()),
        })
    }

    pub fn with_state(preferences: &PrefMap, defaults: &PrefMap) -> Result<Self, StorageError> {
        let daemon = Self::new()?;
        daemon.inner.seed_preferences(preferences)?;
        daemon.inner.seed_defaults(defaults)?;
        Ok(daemon)
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.fail_fetch.set(fail);
    }

    pub fn fail_write(&self, fail: bool) {
        self.fail_write.set(fail);
    }

    pub fn fail_reset(&self, fail: bool) {
        self.fail_reset.set(fail);
    }

    /// Make `write` hang forever, like a daemon that never answers.
    pub fn stall_write(&self, stall: bool) {
        self.stall_write.set(stall);
    }

    pub fn stall_reset(&self, stall: bool) {
        self.stall_reset.set(stall);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.get()
    }

    pub fn write_calls(&self) -> usize {
        self.writes.borrow().len()
    }

    pub fn reset_calls(&self) -> usize {
        self.reset_calls.get()
    }

    /// Every change set passed to `write`, failed ones included.
    pub fn writes(&self) -> Vec<PrefMap> {
        self.writes.borrow().clone()
    }

    pub fn clear_counters(&self) {
        self.fetch_calls.set(0);
        self.reset_calls.set(0);
        self.writes.borrow_mut().clear();
    }

    /// Seed the stored state directly, as if another client had written it.
    pub fn overwrite_stored(&self, preferences: &PrefMap) -> Result<(), StorageError> {
        self.inner.seed_preferences(preferences)
    }

    /// Stored state, bypassing counters and failure injection.
    pub async fn stored(&self) -> Result<PrefMap, StorageError> {
        self.inner.fetch().await
    }
}

impl PreferenceRepository for TestDaemon {
    async fn fetch(&self) -> Result<PrefMap, StorageError> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        if self.fail_fetch.get() {
            return Err(StorageError::Unavailable("daemon did not answer".into()));
        }
        self.inner.fetch().await
    }

    async fn write(&self, changes: &PrefMap) -> Result<(), StorageError> {
        self.writes.borrow_mut().push(changes.clone());
        if self.stall_write.get() {
            std::future::pending::<()>().await;
        }
        if self.fail_write.get() {
            return Err(StorageError::Unavailable("daemon did not answer".into()));
        }
        self.inner.write(changes).await
    }

    async fn reset_to_defaults(&self) -> Result<PrefMap, StorageError> {
        self.reset_calls.set(self.reset_calls.get() + 1);
        if self.stall_reset.get() {
            std::future::pending::<()>().await;
        }
        if self.fail_reset.get() {
            return Err(StorageError::Rejected("reset refused".into()));
        }
        self.inner.reset_to_defaults().await
    }
}
