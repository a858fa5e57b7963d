//! Cooperative stop signal observed by every worker.
//!
//! Triggering drops the only sender of a zero-capacity channel. Each listener
//! holds a receiver clone, so a blocked `select!` on it wakes up immediately
//! with a disconnect. Dropping every handle has the same effect.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Creates a connected handle/listener pair.
pub fn stop_signal() -> (StopHandle, StopListener) {
    let (tx, rx) = crossbeam_channel::bounded::<()>(0);
    let flag = Arc::new(AtomicBool::new(false));
    (
        StopHandle {
            tx: Arc::new(Mutex::new(Some(tx))),
            flag: flag.clone(),
        },
        StopListener { rx, flag },
    )
}

/// Triggers the stop. Cloneable so a signal handler can own one.
#[derive(Clone)]
pub struct StopHandle {
    tx: Arc<Mutex<Option<Sender<()>>>>,
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Idempotent.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // A poisoned lock still holds the sender; take it either way.
        let mut guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Observes a [`StopHandle`].
#[derive(Clone)]
pub struct StopListener {
    rx: Receiver<()>,
    flag: Arc<AtomicBool>,
}

impl StopListener {
    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Blocks for at most `timeout`; returns `true` if the stop fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_triggered() {
            return true;
        }
        // Nothing is ever sent, so any wake-up other than a timeout is a
        // disconnect: either `trigger` ran or every handle was dropped.
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_triggered(),
            _ => true,
        }
    }

    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_not_triggered_initially() {
        let (handle, listener) = stop_signal();
        assert!(!handle.is_triggered());
        assert!(!listener.is_triggered());
        assert!(!listener.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_trigger_reaches_all_clones() {
        let (handle, listener) = stop_signal();
        let other = listener.clone();
        handle.clone().trigger();
        assert!(listener.is_triggered());
        assert!(other.wait_timeout(Duration::from_secs(1)));
        // Second trigger is a no-op.
        handle.trigger();
        assert!(handle.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_blocked_waiter() {
        let (handle, listener) = stop_signal();
        let waiter = thread::spawn(move || {
            let start = Instant::now();
            let fired = listener.wait_timeout(Duration::from_secs(10));
            (fired, start.elapsed())
        });
        thread::sleep(Duration::from_millis(20));
        handle.trigger();
        let (fired, elapsed) = waiter.join().unwrap();
        assert!(fired);
        assert!(elapsed < Duration::from_secs(5));
    }
}
