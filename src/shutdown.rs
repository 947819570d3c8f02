//! Cooperative shutdown: a flag plus a channel that wakes sleepers.
//!
//! Backoff and scheduler sleeps go through [`Shutdown::sleep`] so a SIGINT
//! interrupts them immediately instead of waiting out the delay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

/// Requests shutdown. Held by the process entry point (and its signal
/// thread); dropping it without triggering does NOT request shutdown.
pub struct ShutdownTrigger {
    flag: Arc<AtomicBool>,
    sender: Mutex<Option<Sender<()>>>,
}

impl ShutdownTrigger {
    /// Request shutdown: sets the flag and wakes every sleeper.
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Dropping the sender disconnects the channel, waking all receivers.
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Observer side, cloned into every repository thread.
#[derive(Clone)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
    receiver: Receiver<()>,
}

impl Shutdown {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning `true` if shutdown interrupted it.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        match self.receiver.recv_timeout(duration) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) => self.is_cancelled(),
            Err(RecvTimeoutError::Disconnected) => {
                // Either a real trigger (flag set) or the trigger was dropped
                // without firing; in the latter case the channel can never
                // wake us again, so sleep plainly.
                if self.is_cancelled() {
                    true
                } else {
                    std::thread::sleep(duration);
                    self.is_cancelled()
                }
            }
        }
    }
}

/// Create a connected trigger/observer pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let flag = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = crossbeam_channel::unbounded();
    (
        ShutdownTrigger {
            flag: flag.clone(),
            sender: Mutex::new(Some(sender)),
        },
        Shutdown { flag, receiver },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn sleep_runs_to_completion_without_trigger() {
        let (_trigger, shutdown) = channel();
        let interrupted = shutdown.sleep(Duration::from_millis(10));
        assert!(!interrupted);
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn trigger_wakes_a_sleeping_thread() {
        let (trigger, shutdown) = channel();
        let handle = std::thread::spawn(move || {
            let t0 = Instant::now();
            let interrupted = shutdown.sleep(Duration::from_secs(30));
            (interrupted, t0.elapsed())
        });

        std::thread::sleep(Duration::from_millis(20));
        trigger.trigger();

        let (interrupted, elapsed) = handle.join().unwrap();
        assert!(interrupted);
        assert!(elapsed < Duration::from_secs(5), "sleep was not interrupted");
    }

    #[test]
    fn dropped_trigger_without_firing_does_not_cancel() {
        let (trigger, shutdown) = channel();
        drop(trigger);
        assert!(!shutdown.sleep(Duration::from_millis(5)));
        assert!(!shutdown.is_cancelled());
    }

    #[test]
    fn cancelled_sleep_returns_immediately() {
        let (trigger, shutdown) = channel();
        trigger.trigger();
        assert!(shutdown.sleep(Duration::from_secs(30)));
        assert!(shutdown.is_cancelled());
    }
}
