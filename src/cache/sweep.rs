//! Background sweep — periodic reclamation of expired cache entries.
//!
//! Expired entries are already invisible to `get`, but without a sweep their
//! memory is only reclaimed when a caller happens to touch them. The sweeper
//! runs `purge_expired` on an interval so idle entries are dropped too.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::CacheStore;

/// Statistics from a sweeper thread.
#[derive(Debug, Default, Clone)]
pub struct SweepStats {
    /// Total entries removed across all cycles.
    pub removed: usize,
    /// Number of sweep cycles completed.
    pub cycles: usize,
}

/// Handle to a background sweeper thread. Drop or call `stop()` to shut down.
pub struct SweepHandle {
    stop_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<SweepStats>>,
}

impl SweepHandle {
    /// Stop the sweeper and wait for it to finish. Returns stats.
    pub fn stop(mut self) -> SweepStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            SweepStats::default()
        }
    }

    /// Signal stop without waiting.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(());
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Start sweeping `cache` every `interval`.
///
/// Spawns a background thread; the returned handle stops it. Waiting happens
/// on the stop channel itself, so shutdown is prompt even with a long
/// interval.
pub fn sweep(cache: Arc<dyn CacheStore>, interval: Duration) -> SweepHandle {
    let (stop_tx, stop_rx) = mpsc::channel();

    let handle = thread::spawn(move || {
        let mut stats = SweepStats::default();

        loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                Err(mpsc::RecvTimeoutError::Timeout) => {}
            }

            stats.cycles += 1;
            let removed = cache.purge_expired();
            stats.removed += removed;
            if removed > 0 {
                log::debug!("cache sweep removed {} expired entries", removed);
            }
        }

        stats
    });

    SweepHandle {
        stop_tx,
        handle: Some(handle),
    }
}
