//! The trait boundary between the directory manager and a concrete Bloom
//! filter implementation.
//!
//! The manager never touches a bit array directly; it only ever holds a
//! `Arc<dyn FilterObject>` obtained from a `FilterBackend`. This mirrors the
//! storage-trait seam the rest of the ambient stack uses to keep the core
//! ignorant of any particular persistence format.

use crate::error::Error;
use std::collections::BTreeMap;

/// Per-filter configuration, supplied at `create` time or defaulted from the
/// manager's own configuration.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FilterConfig {
    /// When true, the filter never persists to disk; `unmap`/`clear` are
    /// no-ops against it.
    pub in_memory: bool,

    /// Backend-specific tuning knobs (bit array size, hash count, ...),
    /// opaque to the manager.
    pub params: BTreeMap<String, String>,
}

/// Factory for [`FilterObject`] instances, implemented once per storage
/// technology (in-memory, local disk, ...).
pub trait FilterBackend: Send + Sync {
    /// Materializes a filter named `name`.
    ///
    /// `create_if_missing = true` is the "created now" path used by
    /// [`crate::Manager::create`]; `false` is the "open existing only" path
    /// used by the startup loader.
    fn init(
        &self,
        config: &FilterConfig,
        name: &str,
        create_if_missing: bool,
    ) -> Result<std::sync::Arc<dyn FilterObject>, Error>;
}

/// A single Bloom filter's storage-facing operations.
///
/// Implementations are free to use interior mutability; callers are
/// expected to serialize mutating access externally (the manager does this
/// via each [`crate::handle::FilterHandle`]'s read/write lock), so methods
/// here take `&self` rather than `&mut self`.
pub trait FilterObject: Send + Sync {
    /// Tests membership of `key`.
    fn contains(&self, key: &[u8]) -> Result<bool, Error>;

    /// Adds `key`, returning `true` iff it was not already present
    /// (best-effort for probabilistic filters; an implementation that
    /// cannot tell may always return `true`).
    fn add(&self, key: &[u8]) -> Result<bool, Error>;

    /// Persists any buffered state.
    fn flush(&self) -> Result<(), Error>;

    /// Releases in-memory resources, keeping on-disk data intact. A
    /// subsequent `contains`/`add` call transparently remaps.
    fn close(&self) -> Result<(), Error>;

    /// Removes the on-disk representation entirely.
    fn delete(&self) -> Result<(), Error>;

    /// True iff the filter is currently unmapped from memory.
    fn is_proxied(&self) -> bool;
}
