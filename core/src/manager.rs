//! [`Manager`]: the public façade coordinating the directory, the
//! backend, and the reaper.

use crate::config::Config;
use crate::error::{Error, KeyOpError};
use crate::filter::{FilterBackend, FilterConfig, FilterObject};
use crate::handle::FilterHandle;
use crate::loader;
use crate::reaper::ReaperHandle;
use crate::version::DirectoryVersion;
use std::sync::{Arc, Mutex, RwLock, atomic::{AtomicU64, Ordering}};
use trace_err::TraceErrResult;

/// Owns the directory's head pointer, serializes mutations through a
/// single writer mutex, and runs the background reaper for the lifetime of
/// the manager.
///
/// `Manager` is normally held behind an `Arc` so the reaper thread and
/// every caller share the same instance; [`Manager::new`] returns one
/// already wrapped.
pub struct Manager {
    head: Arc<RwLock<Arc<DirectoryVersion>>>,
    writer: Mutex<()>,
    next_vsn: AtomicU64,
    backend: Arc<dyn FilterBackend>,
    default_config: FilterConfig,
    reaper: Mutex<ReaperHandle>,
}

impl Manager {
    /// Constructs a manager, running the startup loader against
    /// `config.data_dir` (if set) and starting the reaper thread.
    pub fn new(config: Config, backend: Arc<dyn FilterBackend>) -> Arc<Self> {
        let initial_map = match &config.data_dir {
            Some(dir) => loader::load(dir, backend.as_ref(), &config.default_filter),
            None => Default::default(),
        };

        let mut head_version = DirectoryVersion::empty(1);
        // `empty` gives us an `Arc` with no other owners yet, so this is
        // the one place we're allowed to build the map in place rather
        // than through `DirectoryVersion::fork`.
        Arc::get_mut(&mut head_version)
            .trace_expect("freshly constructed version has one owner")
            .set_initial_map(initial_map);

        let head = Arc::new(RwLock::new(head_version));
        let reaper = ReaperHandle::spawn(head.clone());

        Arc::new(Self {
            head,
            writer: Mutex::new(()),
            next_vsn: AtomicU64::new(2),
            backend,
            default_config: config.default_filter,
            reaper: Mutex::new(reaper),
        })
    }

    fn head(&self) -> Arc<DirectoryVersion> {
        self.head.read().trace_expect("head lock poisoned").clone()
    }

    fn next_vsn(&self) -> u64 {
        self.next_vsn.fetch_add(1, Ordering::Relaxed)
    }

    /// Publishes `version` as the new head and wakes the reaper so the
    /// version it displaces doesn't wait out a full poll interval before
    /// retirement starts.
    fn publish(&self, version: Arc<DirectoryVersion>) {
        *self.head.write().trace_expect("head lock poisoned") = version;
        self.reaper.lock().trace_expect("reaper handle lock poisoned").notify();
    }

    fn resolve(&self, name: &str) -> Result<(Arc<DirectoryVersion>, Arc<FilterHandle>), Error> {
        let head = self.head();
        match head.take_filter(name) {
            Some(handle) => Ok((head, handle)),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    /// Creates a new filter. `AlreadyExists` if `name` is already present
    /// (regardless of its activity — a second `create` before the first
    /// drop's tombstone clears is always rejected, matching the directory
    /// map's presence check rather than an activity check).
    pub fn create(&self, name: &str, config: Option<FilterConfig>) -> Result<(), Error> {
        let _guard = self.writer.lock().trace_expect("writer lock poisoned");

        let head = self.head();
        if head.map.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        let filter_config = config.clone().unwrap_or_else(|| self.default_config.clone());
        let filter = self.backend.init(&filter_config, name, true)?;
        let handle = FilterHandle::new(name.to_string(), filter, config, filter_config.in_memory);

        let vsn = self.next_vsn();
        let new_head = DirectoryVersion::fork(&head, vsn, |edit| {
            edit.map.insert(name.to_string(), handle);
        });
        self.publish(new_head);
        tracing::info!(filter = name, "created filter");
        Ok(())
    }

    /// Removes `name` from the directory and marks it for destruction once
    /// its carrying version cools.
    pub fn drop(&self, name: &str) -> Result<(), Error> {
        self.retire(name, true)
    }

    /// Like [`Self::drop`], but only legal while the filter is proxied
    /// (unmapped from memory), and the reaper is told to close rather than
    /// destroy the underlying data once cooled.
    pub fn clear(&self, name: &str) -> Result<(), Error> {
        let _guard = self.writer.lock().trace_expect("writer lock poisoned");

        let head = self.head();
        let handle = head
            .map
            .get(name)
            .filter(|h| h.is_active())
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if !handle.with_read(|f| f.is_proxied()) {
            return Err(Error::NotProxied(name.to_string()));
        }

        self.retire_locked(&head, name, false)
    }

    fn retire(&self, name: &str, should_delete: bool) -> Result<(), Error> {
        let _guard = self.writer.lock().trace_expect("writer lock poisoned");
        let head = self.head();
        if !head.map.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        self.retire_locked(&head, name, should_delete)
    }

    /// Common tail of `drop`/`clear`: deactivate, fork a version without
    /// the entry, tombstone the handle on the predecessor, publish.
    /// Assumes the writer lock is already held by the caller.
    fn retire_locked(&self, head: &Arc<DirectoryVersion>, name: &str, should_delete: bool) -> Result<(), Error> {
        let handle = head
            .map
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        handle.deactivate();
        handle.set_should_delete(should_delete);

        let vsn = self.next_vsn();
        // The tombstone is carried by the version whose creation made the
        // removal visible — this one, not `head` — so that when this
        // version later becomes the reaper's `old` (once superseded in
        // turn), `reap` finds it via `v.tombstone` (§4.5 step 3).
        let new_head = DirectoryVersion::fork(head, vsn, |edit| {
            edit.map.remove(name);
            edit.tombstone = Some(handle);
        });
        self.publish(new_head);
        tracing::info!(filter = name, should_delete, "retired filter");
        Ok(())
    }

    /// Releases the underlying filter's in-memory resources while leaving
    /// it in the directory; a later access transparently remaps it. A
    /// no-op for `in_memory` filters, which have no on-disk representation
    /// to unmap to (§6).
    pub fn unmap(&self, name: &str) -> Result<(), Error> {
        let (_, handle) = self.resolve(name)?;
        if handle.is_in_memory() {
            return Ok(());
        }
        handle.with_write(|f| f.close())?;
        Ok(())
    }

    /// Persists any buffered state for `name`.
    pub fn flush(&self, name: &str) -> Result<(), Error> {
        let (_, handle) = self.resolve(name)?;
        handle.mark_hot();
        handle.with_read(|f| f.flush())
    }

    /// Tests membership of each key in `keys`, stopping at the first
    /// backend error. Results gathered before the failure are retained on
    /// [`KeyOpError::partial`] rather than discarded (§4.3, §7).
    pub fn check_keys(&self, name: &str, keys: &[Vec<u8>]) -> Result<Vec<bool>, KeyOpError> {
        let (_, handle) = self.resolve(name).map_err(|error| KeyOpError { partial: Vec::new(), error })?;
        handle.mark_hot();
        handle.with_read(|f| {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                match f.contains(key) {
                    Ok(found) => results.push(found),
                    Err(error) => return Err(KeyOpError { partial: results, error }),
                }
            }
            Ok(results)
        })
    }

    /// Adds each key in `keys`, stopping at the first backend error.
    /// Results gathered before the failure are retained on
    /// [`KeyOpError::partial`] rather than discarded (§4.3, §7).
    pub fn set_keys(&self, name: &str, keys: &[Vec<u8>]) -> Result<Vec<bool>, KeyOpError> {
        let (_, handle) = self.resolve(name).map_err(|error| KeyOpError { partial: Vec::new(), error })?;
        handle.mark_hot();
        handle.with_write(|f| {
            let mut results = Vec::with_capacity(keys.len());
            for key in keys {
                match f.add(key) {
                    Ok(added) => results.push(added),
                    Err(error) => return Err(KeyOpError { partial: results, error }),
                }
            }
            Ok(results)
        })
    }

    /// Lists every currently active filter name.
    pub fn list_all(&self) -> Vec<String> {
        let head = self.head();
        head.map
            .values()
            .filter(|h| h.is_active())
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Lists filters that have seen no activity since the previous
    /// `list_cold` call and are currently proxied. Has side effects: every
    /// hot filter observed here has its hot flag cleared for next time
    /// (§4.3).
    pub fn list_cold(&self) -> Vec<String> {
        let head = self.head();
        head.map
            .values()
            .filter(|h| h.is_active())
            .filter(|h| !h.take_hot())
            .filter(|h| !h.with_read(|f| f.is_proxied()))
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Runs `f` against the raw filter object without taking its lock.
    /// Intended for read-only metadata inspection only (§4.3) — `f` must
    /// not mutate the filter.
    pub fn with_filter<R>(&self, name: &str, f: impl FnOnce(&dyn FilterObject) -> R) -> Result<R, Error> {
        let (_, handle) = self.resolve(name)?;
        Ok(f(handle.filter().as_ref()))
    }

    /// Stops the reaper and closes (never deletes) every filter still
    /// reachable from the version chain, including tombstones the reaper
    /// hadn't yet finalized.
    pub fn shutdown(&self) {
        self.reaper.lock().trace_expect("reaper handle lock poisoned").shutdown();

        let mut version = Some(self.head());
        while let Some(v) = version {
            for handle in v.map.values() {
                handle.finalize_for_shutdown();
            }
            if let Some(tombstone) = &v.tombstone {
                tombstone.finalize_for_shutdown();
            }
            version = v.prev.lock().trace_expect("version lock poisoned").take();
        }
        tracing::info!("manager shutdown complete");
    }
}
