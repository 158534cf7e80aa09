//! The background worker that retires cold directory versions and
//! finalizes the filters they tombstoned.

use crate::version::DirectoryVersion;
use std::sync::{
    Arc, Condvar, Mutex, RwLock,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;
use trace_err::TraceErrResult;

/// How long a version must sit with no access before the reaper reclaims
/// it. Not user-configurable (§5): a knob this fine-grained belongs to the
/// implementation, not the operator — it is exposed read-only (re-exported
/// at the crate root) purely so operators and integration tests can reason
/// about reclamation latency. Shortened under `cfg(test)` so this crate's
/// own unit tests exercising reclamation don't take 15+ seconds each.
#[cfg(not(test))]
pub const VERSION_COOLDOWN: Duration = Duration::from_secs(15);
#[cfg(test)]
pub const VERSION_COOLDOWN: Duration = Duration::from_millis(50);

/// How often the reaper checks whether the head has moved.
#[cfg(not(test))]
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(1);
#[cfg(test)]
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Handle to the running reaper thread. Dropping this without calling
/// [`ReaperHandle::shutdown`] leaks the thread (it is daemon-like by
/// design); `Manager::shutdown` always calls it explicitly.
pub(crate) struct ReaperHandle {
    should_run: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    join: Option<std::thread::JoinHandle<()>>,
}

impl ReaperHandle {
    pub(crate) fn spawn(head: Arc<RwLock<Arc<DirectoryVersion>>>) -> Self {
        let should_run = Arc::new(AtomicBool::new(true));
        let wake = Arc::new((Mutex::new(false), Condvar::new()));

        let should_run_thread = should_run.clone();
        let wake_thread = wake.clone();
        let join = std::thread::Builder::new()
            .name("bloomd-reaper".into())
            .spawn(move || run(head, should_run_thread, wake_thread))
            .trace_expect("failed to spawn reaper thread");

        Self {
            should_run,
            wake,
            join: Some(join),
        }
    }

    /// Wakes the reaper immediately instead of waiting out its poll
    /// interval; used after a publish so retirement isn't needlessly
    /// delayed.
    pub(crate) fn notify(&self) {
        let (lock, cvar) = &*self.wake;
        let mut pending = lock.lock().trace_expect("reaper wake lock poisoned");
        *pending = true;
        cvar.notify_one();
    }

    pub(crate) fn shutdown(&mut self) {
        self.should_run.store(false, Ordering::Release);
        self.notify();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn wait(wake: &(Mutex<bool>, Condvar), timeout: Duration) {
    let (lock, cvar) = wake;
    let pending = lock.lock().trace_expect("reaper wake lock poisoned");
    let (mut pending, _) = cvar
        .wait_timeout_while(pending, timeout, |p| !*p)
        .trace_expect("reaper wake lock poisoned");
    *pending = false;
}

fn run(
    head: Arc<RwLock<Arc<DirectoryVersion>>>,
    should_run: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
) {
    let mut last_seen_vsn = 0u64;
    while should_run.load(Ordering::Acquire) {
        wait(&wake, POLL_INTERVAL);
        if !should_run.load(Ordering::Acquire) {
            break;
        }

        let current = head.read().trace_expect("head lock poisoned").clone();
        if current.vsn == last_seen_vsn {
            continue;
        }
        last_seen_vsn = current.vsn;

        let old = current.prev.lock().trace_expect("version lock poisoned").take();
        if let Some(old) = old {
            reap(old, &should_run, &wake);
        }
    }
}

/// Recursively reaps `v` and everything behind it, oldest first (§4.5).
fn reap(v: Arc<DirectoryVersion>, should_run: &AtomicBool, wake: &(Mutex<bool>, Condvar)) {
    let older = v.prev.lock().trace_expect("version lock poisoned").take();
    if let Some(older) = older {
        reap(older, should_run, wake);
    }

    loop {
        v.take_hot();
        wait(wake, VERSION_COOLDOWN);
        if !should_run.load(Ordering::Acquire) {
            // Shutdown in progress: leave this version's tombstone alone.
            // `Manager::shutdown` walks the remaining chain itself and
            // closes (never deletes) whatever it finds.
            return;
        }
        if !v.take_hot() {
            break;
        }
    }

    if let Some(tombstone) = &v.tombstone {
        tombstone.finalize();
    }
    // `v` drops here; live entries shared with newer versions are
    // untouched since the map only ever holds `Arc<FilterHandle>`.
}

