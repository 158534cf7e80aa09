//! [`FilterHandle`]: the per-filter unit of lifecycle and locking.

use crate::filter::{FilterConfig, FilterObject};
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, Ordering},
};
use trace_err::TraceErrResult;

/// Wraps one Bloom filter with the bookkeeping the manager and reaper need:
/// a read/write lock serializing access to it, and the three flags that
/// drive its lifecycle (§3 of the design).
pub struct FilterHandle {
    name: String,
    filter: Arc<dyn FilterObject>,
    custom_config: Option<FilterConfig>,

    /// Resolved from whichever config (custom or the manager's default)
    /// this handle was built with. Unlike `custom_config`, this is always
    /// known, even when the handle uses the manager's default — `unmap`
    /// needs it regardless of which config supplied it (§6).
    in_memory: bool,

    /// Guards mutating access to `filter`. Readers (check_keys, flush) take
    /// the read side; writers (set_keys) take the write side. Does not
    /// protect `filter` itself from being dropped — that's governed by
    /// `Arc` refcounting across directory versions.
    rwlock: RwLock<()>,

    /// Cleared exactly once, under the manager's writer mutex, when this
    /// handle stops being reachable from the head version's map.
    is_active: AtomicBool,

    /// Set on every successful lookup; cleared by the reaper's cold scan.
    is_hot: AtomicBool,

    /// Chosen at drop/clear time. Governs whether the reaper destroys or
    /// merely closes the underlying filter once this handle's carrying
    /// version has cooled.
    should_delete: AtomicBool,
}

impl FilterHandle {
    /// Builds a freshly created handle: active and hot (§3 — a filter
    /// created just now is assumed about to be used). `in_memory` is the
    /// resolved flag (custom config if one was given, else the manager's
    /// default) that the filter was actually opened with.
    pub(crate) fn new(
        name: String,
        filter: Arc<dyn FilterObject>,
        custom_config: Option<FilterConfig>,
        in_memory: bool,
    ) -> Arc<Self> {
        Self::build(name, filter, custom_config, in_memory, true)
    }

    /// Builds a handle recovered from disk at startup: active but not hot,
    /// so an immediate `list_cold` call after a restart doesn't have to
    /// wait out a full cooldown to see it (§4.4, §8 invariant 8).
    pub(crate) fn new_cold(
        name: String,
        filter: Arc<dyn FilterObject>,
        custom_config: Option<FilterConfig>,
        in_memory: bool,
    ) -> Arc<Self> {
        Self::build(name, filter, custom_config, in_memory, false)
    }

    fn build(
        name: String,
        filter: Arc<dyn FilterObject>,
        custom_config: Option<FilterConfig>,
        in_memory: bool,
        hot: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            filter,
            custom_config,
            in_memory,
            rwlock: RwLock::new(()),
            is_active: AtomicBool::new(true),
            is_hot: AtomicBool::new(hot),
            should_delete: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Option<&FilterConfig> {
        self.custom_config.as_ref()
    }

    /// True iff this filter was opened with `in_memory = true`, in which
    /// case it has no on-disk representation for `unmap` to release (§6).
    pub(crate) fn is_in_memory(&self) -> bool {
        self.in_memory
    }

    pub(crate) fn filter(&self) -> &Arc<dyn FilterObject> {
        &self.filter
    }

    pub(crate) fn is_active(&self) -> bool {
        self.is_active.load(Ordering::Acquire)
    }

    pub(crate) fn deactivate(&self) {
        self.is_active.store(false, Ordering::Release);
    }

    pub(crate) fn mark_hot(&self) {
        self.is_hot.store(true, Ordering::Relaxed);
    }

    /// Reads and clears the hot flag in one step, the way the reaper's cold
    /// scan observes it.
    pub(crate) fn take_hot(&self) -> bool {
        self.is_hot.swap(false, Ordering::Relaxed)
    }

    pub(crate) fn set_should_delete(&self, value: bool) {
        self.should_delete.store(value, Ordering::Relaxed);
    }

    fn should_delete(&self) -> bool {
        self.should_delete.load(Ordering::Relaxed)
    }

    /// Acquires the read lock and runs `f` against the underlying filter.
    pub(crate) fn with_read<R>(&self, f: impl FnOnce(&dyn FilterObject) -> R) -> R {
        let _guard = self.rwlock.read().trace_expect("filter lock poisoned");
        f(self.filter.as_ref())
    }

    /// Acquires the write lock and runs `f` against the underlying filter.
    pub(crate) fn with_write<R>(&self, f: impl FnOnce(&dyn FilterObject) -> R) -> R {
        let _guard = self.rwlock.write().trace_expect("filter lock poisoned");
        f(self.filter.as_ref())
    }

    /// Destruction protocol (§4.1): destroy-or-close the underlying filter,
    /// then let `self` and the `FilterObject` fall out of scope. Invoked
    /// only by the reaper, strictly after this handle's carrying version
    /// has cooled, or by an explicit manager shutdown (which always closes,
    /// never deletes — see [`Self::finalize_for_shutdown`]).
    pub(crate) fn finalize(&self) {
        let result = if self.should_delete() {
            self.filter.delete()
        } else {
            self.filter.close()
        };
        if let Err(e) = result {
            tracing::error!(filter = %self.name, error = %e, "failed to finalize filter");
        }
    }

    /// Shutdown always closes, never deletes, regardless of a pending
    /// `should_delete` intent (§9: deleting on-disk data is never a side
    /// effect of process shutdown).
    pub(crate) fn finalize_for_shutdown(&self) {
        if let Err(e) = self.filter.close() {
            tracing::warn!(filter = %self.name, error = %e, "failed to close filter during shutdown");
        }
    }
}
