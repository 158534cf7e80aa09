//! Startup-time directory scan that materializes on-disk filters into the
//! manager's initial directory version.

use crate::filter::{FilterBackend, FilterConfig};
use crate::handle::FilterHandle;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Filesystem entries under the data directory that carry a persisted
/// filter are named `bloomd.<filter-name>`.
pub(crate) const ENTRY_PREFIX: &str = "bloomd.";

/// Scans `data_dir` for entries matching [`ENTRY_PREFIX`] and opens each as
/// a non-hot handle. A single filter's failure to open is logged and
/// skipped rather than aborting the whole scan (§4.4).
pub(crate) fn load(
    data_dir: &Path,
    backend: &dyn FilterBackend,
    default_config: &FilterConfig,
) -> HashMap<String, Arc<FilterHandle>> {
    let mut map = HashMap::new();

    let entries = match std::fs::read_dir(data_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %data_dir.display(), error = %e, "failed to read data directory");
            return map;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|n| n.strip_prefix(ENTRY_PREFIX)) else {
            continue;
        };

        match backend.init(default_config, name, false) {
            Ok(filter) => {
                let handle = FilterHandle::new_cold(name.to_string(), filter, None, default_config.in_memory);
                map.insert(name.to_string(), handle);
                tracing::info!(filter = name, "loaded filter from disk");
            }
            Err(e) => {
                tracing::warn!(filter = name, error = %e, "failed to load filter, skipping");
            }
        }
    }

    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::filter::FilterObject;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// A backend whose `init` always succeeds, so these tests exercise
    /// [`load`]'s directory scan and prefix-stripping in isolation from any
    /// particular filter implementation's open-existing-only semantics.
    struct AlwaysOpens;

    impl FilterBackend for AlwaysOpens {
        fn init(&self, _config: &FilterConfig, name: &str, _create_if_missing: bool) -> Result<Arc<dyn FilterObject>, Error> {
            Ok(Arc::new(Stub { name: name.to_string() }))
        }
    }

    struct Stub {
        name: String,
    }

    impl FilterObject for Stub {
        fn contains(&self, _key: &[u8]) -> Result<bool, Error> {
            Ok(false)
        }
        fn add(&self, _key: &[u8]) -> Result<bool, Error> {
            Ok(true)
        }
        fn flush(&self) -> Result<(), Error> {
            Ok(())
        }
        fn close(&self) -> Result<(), Error> {
            Ok(())
        }
        fn delete(&self) -> Result<(), Error> {
            Ok(())
        }
        fn is_proxied(&self) -> bool {
            false
        }
    }

    /// A backend that fails to open exactly one named filter, so a single
    /// bad entry doesn't abort the whole scan (§4.4).
    struct FailsOne {
        bad_name: &'static str,
        saw_bad: AtomicBool,
    }

    impl FilterBackend for FailsOne {
        fn init(&self, _config: &FilterConfig, name: &str, _create_if_missing: bool) -> Result<Arc<dyn FilterObject>, Error> {
            if name == self.bad_name {
                self.saw_bad.store(true, Ordering::SeqCst);
                return Err(Error::internal(std::io::Error::other("simulated open failure")));
            }
            Ok(Arc::new(Stub { name: name.to_string() }))
        }
    }

    #[test]
    fn strips_prefix_and_skips_unrelated_entries() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bloomd.users")).unwrap();
        std::fs::create_dir(dir.path().join("bloomd.events")).unwrap();
        std::fs::create_dir(dir.path().join("not-a-filter-dir")).unwrap();
        std::fs::write(dir.path().join("bloomd.leftover-file"), b"x").unwrap();

        let backend = AlwaysOpens;
        let map = load(dir.path(), &backend, &FilterConfig::default());

        let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
        names.sort();
        assert_eq!(names, vec!["events", "leftover-file", "users"]);
        assert!(map.values().all(|h| !h.take_hot()), "loaded handles start non-hot");
    }

    #[test]
    fn one_bad_entry_does_not_abort_the_scan() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("bloomd.good")).unwrap();
        std::fs::create_dir(dir.path().join("bloomd.bad")).unwrap();

        let backend = FailsOne {
            bad_name: "bad",
            saw_bad: AtomicBool::new(false),
        };
        let map = load(dir.path(), &backend, &FilterConfig::default());

        assert!(backend.saw_bad.load(Ordering::SeqCst));
        assert_eq!(map.keys().map(String::as_str).collect::<Vec<_>>(), vec!["good"]);
    }

    #[test]
    fn missing_data_dir_yields_empty_map() {
        let backend = AlwaysOpens;
        let map = load(Path::new("/nonexistent/bloomd-test-path"), &backend, &FilterConfig::default());
        assert!(map.is_empty());
    }
}
