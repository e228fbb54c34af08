// Cooperative cancellation shared between the host, the task runner, the retry loop and the
// local process launcher.
//
// A `CancellationToken` is a cheap clonable handle. Once `cancel` is called every clone sees
// it: the task runner stops dispatching, sleeping retries wake up and abort, and running
// processes are killed by the launcher's poll loop.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Shared {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        *self.flag() = true;
        self.shared.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag()
    }

    /// Sleeps up to `duration`. Returns `false` if the token was cancelled before or
    /// during the sleep.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.flag();
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            cancelled = match self.shared.wakeup.wait_timeout(cancelled, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        false
    }

    fn flag(&self) -> MutexGuard<'_, bool> {
        self.shared
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Something that can wait between retry attempts.
///
/// Returns `false` when the wait was interrupted.
pub trait Pause: Send + Sync {
    fn pause(&self, duration: Duration) -> bool;
}

impl Pause for CancellationToken {
    fn pause(&self, duration: Duration) -> bool {
        self.sleep(duration)
    }
}
