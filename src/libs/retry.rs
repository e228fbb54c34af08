// Bounded retry with a fixed delay between attempts.
//
// The delay goes through a `Pause`, so cancelling the run interrupts a sleeping retry and
// aborts the whole loop rather than just the current attempt.

use crate::error::RetryError;
use crate::libs::utilities::cancel::{CancellationToken, Pause};
use crate::{log_debug, log_warn};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    pause: Arc<dyn Pause>,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; zero is treated as one.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
            pause: Arc::new(CancellationToken::new()),
        }
    }

    /// Waits between attempts through `pause` instead of a plain sleep.
    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Runs `work` until it succeeds or the attempts are used up.
    ///
    /// `work` receives the 1-based attempt number.
    ///
    /// # Returns
    /// * the first success,
    /// * `RetryError::Exhausted` with the last error after `max_attempts` failures,
    /// * `RetryError::Interrupted` when a delay was interrupted.
    pub fn run<T, E, F>(&self, mut work: F) -> Result<T, RetryError<E>>
    where
        E: std::error::Error + 'static,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            let error = match work(attempt) {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            if attempt >= self.max_attempts {
                log_warn!("[Retry] Giving up after {} attempt(s): {}", attempt, error);
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: error,
                });
            }
            log_debug!(
                "[Retry] Attempt {}/{} failed: {}. Retrying in {:?}",
                attempt,
                self.max_attempts,
                error,
                self.delay
            );
            if !self.pause.pause(self.delay) {
                log_warn!("[Retry] Interrupted while waiting after attempt {}", attempt);
                return Err(RetryError::Interrupted {
                    attempts: attempt,
                    last: Some(error),
                });
            }
            attempt += 1;
        }
    }

    /// Runs `work` until `accept` approves its value or the attempts are used up.
    ///
    /// Unlike [`run`](Self::run) nothing is discarded: the last value is returned even when
    /// it was never accepted, and an interrupted delay returns the value that preceded it.
    pub fn run_until<T, F, A>(&self, mut work: F, accept: A) -> T
    where
        F: FnMut(u32) -> T,
        A: Fn(&T) -> bool,
    {
        let mut attempt = 1;
        loop {
            let value = work(attempt);
            if accept(&value) {
                return value;
            }
            if attempt >= self.max_attempts {
                log_warn!("[Retry] Giving up after {} attempt(s)", attempt);
                return value;
            }
            log_debug!(
                "[Retry] Attempt {}/{} failed. Retrying in {:?}",
                attempt,
                self.max_attempts,
                self.delay
            );
            if !self.pause.pause(self.delay) {
                log_warn!("[Retry] Interrupted while waiting after attempt {}", attempt);
                return value;
            }
            attempt += 1;
        }
    }
}
