//! An in-memory [`FilterBackend`]/[`FilterObject`] pair, grounded on the
//! teacher's in-memory storage mocks: no filesystem, fully deterministic,
//! used by the core crate's own test suite and available to downstream
//! crates for integration tests that don't want real I/O.

use crate::error::Error;
use crate::filter::{FilterBackend, FilterConfig, FilterObject};
use std::collections::HashSet;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

/// Backend that materializes every filter as a plain in-memory key set.
#[derive(Default)]
pub struct MemBackend;

impl MemBackend {
    pub fn new() -> Self {
        Self
    }
}

impl FilterBackend for MemBackend {
    fn init(
        &self,
        _config: &FilterConfig,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Arc<dyn FilterObject>, Error> {
        // `create_if_missing = false` models the loader's "open existing
        // only" path; the in-memory backend has nothing to recover across
        // process restarts, so there is nothing to open.
        if !create_if_missing {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(Arc::new(MemFilter {
            name: name.to_string(),
            keys: Mutex::new(HashSet::new()),
            proxied: AtomicBool::new(false),
        }))
    }
}

struct MemFilter {
    name: String,
    keys: Mutex<HashSet<Vec<u8>>>,
    proxied: AtomicBool,
}

impl MemFilter {
    fn poisoned(&self) -> Error {
        Error::internal(PoisonedLock(self.name.clone()))
    }
}

impl FilterObject for MemFilter {
    fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        self.proxied.store(false, Ordering::Relaxed);
        let keys = self.keys.lock().map_err(|_| self.poisoned())?;
        Ok(keys.contains(key))
    }

    fn add(&self, key: &[u8]) -> Result<bool, Error> {
        self.proxied.store(false, Ordering::Relaxed);
        let mut keys = self.keys.lock().map_err(|_| self.poisoned())?;
        Ok(keys.insert(key.to_vec()))
    }

    fn flush(&self) -> Result<(), Error> {
        Ok(())
    }

    fn close(&self) -> Result<(), Error> {
        self.proxied.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn delete(&self) -> Result<(), Error> {
        let mut keys = self.keys.lock().map_err(|_| self.poisoned())?;
        keys.clear();
        Ok(())
    }

    fn is_proxied(&self) -> bool {
        self.proxied.load(Ordering::Relaxed)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("in-memory filter '{0}' lock poisoned")]
struct PoisonedLock(String);
