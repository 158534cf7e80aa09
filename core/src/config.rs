//! The two manager-level knobs named in the external-interfaces contract:
//! where filters live on disk, and what a filter gets when `create` is
//! called without an explicit per-filter configuration.

use crate::filter::FilterConfig;
use std::path::PathBuf;

/// Manager-level configuration. The [`crate::filter::FilterBackend`]
/// instance itself is supplied separately to [`crate::Manager::new`],
/// since trait objects cannot round-trip through `serde`.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    /// Directory scanned at startup for `bloomd.<name>` entries, and the
    /// base path passed to the backend for persistence. `None` disables
    /// the startup scan entirely (used by the in-memory backend in tests).
    #[cfg_attr(feature = "serde", serde(default))]
    pub data_dir: Option<PathBuf>,

    /// Configuration handed to `create` when the caller doesn't supply one
    /// of its own.
    #[cfg_attr(feature = "serde", serde(default))]
    pub default_filter: FilterConfig,
}
