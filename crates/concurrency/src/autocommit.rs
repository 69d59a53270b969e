//! Background autocommit ticker (spec §4.3): "when enabled, a background
//! ticker attempts a commit every `autocommit_interval` ms if the dirty
//! cache is non-empty; it is suppressed while any atomic, locked, or
//! mutation session is active."

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::prefix::PrefixHandle;

/// Owns the background thread that periodically commits every eligible
/// prefix. Stopping the ticker (via `Drop`) joins the thread.
pub struct AutocommitTicker {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl AutocommitTicker {
    /// Start ticking every `interval`, calling `prefixes()` fresh on each
    /// tick so prefixes opened/closed after the ticker starts are picked
    /// up without restarting it.
    pub fn start<F>(interval: Duration, prefixes: F) -> Self
    where
        F: Fn() -> Vec<Arc<PrefixHandle>> + Send + 'static,
    {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_for_thread = Arc::clone(&stop);
        let handle = std::thread::spawn(move || {
            let (lock, cvar) = &*stop_for_thread;
            let mut guard = lock.lock();
            loop {
                let timed_out = cvar.wait_for(&mut guard, interval).timed_out();
                if *guard {
                    break;
                }
                if !timed_out {
                    continue;
                }
                for prefix in prefixes() {
                    if prefix.autocommit_eligible() && prefix.dirty_len() > 0 {
                        if let Err(e) = prefix.commit() {
                            tracing::warn!(
                                prefix = prefix.name(),
                                error = %e,
                                "autocommit failed, will retry next tick"
                            );
                        }
                    }
                }
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop the ticker and wait for its thread to exit.
    pub fn stop(mut self) {
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            let mut guard = lock.lock();
            *guard = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for AutocommitTicker {
    fn drop(&mut self) {
        self.stop_inner();
    }
}

/// Whether autocommit should run at all, per the host-provided
/// `autocommit: bool` config key (spec §6). Kept as a tiny wrapper so
/// callers can flip it at runtime without recreating the ticker.
#[derive(Debug, Default)]
pub struct AutocommitSwitch(AtomicBool);

impl AutocommitSwitch {
    /// A switch starting in the given state.
    pub fn new(enabled: bool) -> Self {
        Self(AtomicBool::new(enabled))
    }

    /// Whether autocommit is currently enabled.
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Enable or disable autocommit.
    pub fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbzero_core::Limits;
    use tempfile::tempdir;

    fn limits() -> Limits {
        Limits::new(1 << 20, 64, 4096).unwrap()
    }

    #[test]
    fn ticker_commits_dirty_prefixes_on_interval() {
        let dir = tempdir().unwrap();
        let handle = Arc::new(PrefixHandle::create(dir.path(), "p", &limits()).unwrap());
        handle.open(true).unwrap();
        handle.write_dp(0, vec![0u8; 64], vec![7u8; 64]).unwrap();

        let prefixes = {
            let handle = Arc::clone(&handle);
            move || vec![Arc::clone(&handle)]
        };
        let ticker = AutocommitTicker::start(Duration::from_millis(10), prefixes);
        let reached = handle.await_state(1, Duration::from_secs(2)).unwrap();
        ticker.stop();
        assert!(reached);
    }

    #[test]
    fn ticker_leaves_atomic_sections_untouched() {
        let dir = tempdir().unwrap();
        let handle = Arc::new(PrefixHandle::create(dir.path(), "p", &limits()).unwrap());
        handle.open(true).unwrap();
        handle.begin_atomic().unwrap();
        handle.write_dp(0, vec![0u8; 64], vec![7u8; 64]).unwrap();

        let prefixes = {
            let handle = Arc::clone(&handle);
            move || vec![Arc::clone(&handle)]
        };
        let ticker = AutocommitTicker::start(Duration::from_millis(10), prefixes);
        let reached = handle.await_state(1, Duration::from_millis(100)).unwrap();
        ticker.stop();
        assert!(!reached);
        assert_eq!(handle.dirty_len(), 1);
    }

    #[test]
    fn switch_toggles() {
        let switch = AutocommitSwitch::new(true);
        assert!(switch.is_enabled());
        switch.set(false);
        assert!(!switch.is_enabled());
    }
}
