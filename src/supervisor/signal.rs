//! Shared cancellation signal.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// One-way stop flag that pauses can wait on.
///
/// Cloning shares the flag. Once requested, a stop cannot be withdrawn.
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop and wakes every waiter.
    pub fn request_stop(&self) {
        let (lock, cvar) = &*self.inner;
        match lock.lock() {
            Ok(mut stopped) => *stopped = true,
            Err(poisoned) => *poisoned.into_inner() = true,
        }
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        match lock.lock() {
            Ok(stopped) => *stopped,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Sleeps for up to `timeout`, returning early on stop.
    ///
    /// Returns `true` if a stop was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let Ok(mut stopped) = lock.lock() else {
            return true;
        };
        while !*stopped {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            stopped = match cvar.wait_timeout(stopped, remaining) {
                Ok((guard, _)) => guard,
                Err(_) => return true,
            };
        }
        *stopped
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
