//! [`DirectoryVersion`]: an immutable-after-publish snapshot of the
//! name-to-filter directory, linked into a chain back to older versions.

use crate::handle::FilterHandle;
use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

/// One snapshot of the directory. Published by swapping it into the
/// manager's head pointer; retired by the reaper once cold.
///
/// The `map` and `tombstone` fields never change after construction. `prev`
/// is the sole exception: the reaper clears it on the live head version to
/// detach the predecessor chain for reclamation, so it needs its own
/// interior mutability even though every other field here is write-once.
pub(crate) struct DirectoryVersion {
    pub(crate) vsn: u64,
    pub(crate) map: HashMap<String, Arc<FilterHandle>>,
    pub(crate) tombstone: Option<Arc<FilterHandle>>,
    pub(crate) prev: Mutex<Option<Arc<DirectoryVersion>>>,
    is_hot: AtomicBool,
}

impl DirectoryVersion {
    pub(crate) fn empty(vsn: u64) -> Arc<Self> {
        Arc::new(Self {
            vsn,
            map: HashMap::new(),
            tombstone: None,
            prev: Mutex::new(None),
            is_hot: AtomicBool::new(true),
        })
    }

    /// Populates the map of a freshly constructed, not-yet-shared version.
    /// Only valid before the version has been published — callers must
    /// have the sole `Arc` reference, enforced by requiring `&mut self`.
    pub(crate) fn set_initial_map(&mut self, map: HashMap<String, Arc<FilterHandle>>) {
        self.map = map;
    }

    /// Builds the next version from `prev`'s entries, applying `edit`
    /// in-place before the result is published.
    pub(crate) fn fork(prev: &Arc<DirectoryVersion>, vsn: u64, edit: impl FnOnce(&mut VersionEdit)) -> Arc<Self> {
        let mut build = VersionEdit {
            map: prev.map.clone(),
            tombstone: None,
        };
        edit(&mut build);
        Arc::new(Self {
            vsn,
            map: build.map,
            tombstone: build.tombstone,
            prev: Mutex::new(Some(prev.clone())),
            is_hot: AtomicBool::new(true),
        })
    }

    /// Resolution algorithm (§4.3 `take_filter`): marks this version hot and
    /// returns the named handle iff present and active. Never walks `prev`.
    pub(crate) fn take_filter(self: &Arc<Self>, name: &str) -> Option<Arc<FilterHandle>> {
        self.is_hot.store(true, Ordering::Relaxed);
        self.map.get(name).filter(|h| h.is_active()).cloned()
    }

    pub(crate) fn mark_hot(&self) {
        self.is_hot.store(true, Ordering::Relaxed);
    }

    pub(crate) fn take_hot(&self) -> bool {
        self.is_hot.swap(false, Ordering::Relaxed)
    }
}

/// The mutable scratch space passed to the closure building a forked
/// version: start from the predecessor's entries (already copied in),
/// apply exactly one edit.
pub(crate) struct VersionEdit {
    pub(crate) map: HashMap<String, Arc<FilterHandle>>,
    pub(crate) tombstone: Option<Arc<FilterHandle>>,
}
