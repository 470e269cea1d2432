//! Copy-on-write snapshot store
//!
//! The current [`State`] is an immutable value published behind a single
//! reference. Readers clone the `Arc`; writers go through one serialized
//! update path that takes the old snapshot and returns the next one.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::models::State;

pub struct StateStore {
    write_lock: Mutex<()>,
    current: RwLock<Arc<State>>,
    version: AtomicU64,
}

impl StateStore {
    #[must_use]
    pub fn new(initial: State) -> Self {
        Self {
            write_lock: Mutex::new(()),
            current: RwLock::new(Arc::new(initial)),
            version: AtomicU64::new(0),
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn get(&self) -> Arc<State> {
        Arc::clone(&self.current.read())
    }

    /// Number of writes published so far
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Apply `f` to the current snapshot and publish the result.
    pub fn update<F>(&self, f: F) -> Arc<State>
    where
        F: FnOnce(&State) -> State,
    {
        match self.try_update(|cur| Ok::<_, std::convert::Infallible>(f(cur))) {
            Ok(next) => next,
            Err(never) => match never {},
        }
    }

    /// Like [`update`](Self::update), but `f` may refuse the transition. On
    /// error nothing is published and the version is unchanged.
    pub fn try_update<F, E>(&self, f: F) -> Result<Arc<State>, E>
    where
        F: FnOnce(&State) -> Result<State, E>,
    {
        let _guard = self.write_lock.lock();

        let cur = self.get();
        let mut next = f(&cur)?;
        next.updated_at = Some(Utc::now());

        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        self.version.fetch_add(1, Ordering::AcqRel);

        Ok(next)
    }

    /// Swap in a whole snapshot, e.g. one loaded from disk at startup.
    pub fn replace(&self, mut next: State) {
        let _guard = self.write_lock.lock();

        next.updated_at = Some(Utc::now());
        *self.current.write() = Arc::new(next);
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(State::default())
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("version", &self.version())
            .finish()
    }
}
