//! Adaptive pacing of Compute Engine submissions.
//!
//! Snapshot and image creation are heavily rate limited per project. Instead of
//! always sleeping a fixed worst-case delay between disks, the limiter keeps a
//! pause that doubles whenever the API reports throttling and decays back to
//! the floor as calls succeed.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};

/// Smallest backoff step used when the floor is zero.
const MIN_BACKOFF: Duration = Duration::from_secs(1);

/// Longest stretch slept without looking at the cancel flag.
const CANCEL_CHECK: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Pause between disks when nothing is being throttled.
    pub floor: Duration,
    /// Upper bound for the pause and for each retry delay.
    pub ceiling: Duration,
    /// Retries of a throttled call before its error is returned.
    pub max_retries: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            floor: Duration::from_secs(10),
            ceiling: Duration::from_secs(300),
            max_retries: 5,
        }
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    policy: RateLimitPolicy,
    pause: Duration,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        RateLimiter {
            policy,
            pause: policy.floor,
        }
    }

    /// Current pause between disks.
    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Runs `call`, retrying after a growing delay while it is rate limited.
    /// Raising `cancel` ends the retry delay with `Cancelled`.
    pub async fn submit<T, F, Fut>(
        &mut self,
        what: &str,
        cancel: &AtomicBool,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(value) => {
                    self.on_success();
                    return Ok(value);
                }
                Err(e) if e.is_rate_limited() && attempt < self.policy.max_retries => {
                    attempt += 1;
                    self.on_throttled();
                    tracing::warn!(
                        "{} was rate limited; retry {}/{} in {:?}",
                        what,
                        attempt,
                        self.policy.max_retries,
                        self.pause
                    );
                    sleep_unless_cancelled(self.pause, cancel).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleeps for the current pause. Called once per processed disk.
    pub async fn wait(&self, cancel: &AtomicBool) -> Result<()> {
        if self.pause.is_zero() {
            return Ok(());
        }
        tracing::info!("Waiting {:?} before the next disk to avoid rate limits...", self.pause);
        sleep_unless_cancelled(self.pause, cancel).await
    }

    fn on_throttled(&mut self) {
        self.pause = (self.pause * 2).max(MIN_BACKOFF).min(self.policy.ceiling);
    }

    fn on_success(&mut self) {
        self.pause = (self.pause / 2).max(self.policy.floor);
    }
}

async fn sleep_unless_cancelled(duration: Duration, cancel: &AtomicBool) -> Result<()> {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.load(Ordering::SeqCst) {
            return Err(Error::Cancelled);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(());
        }
        tokio::time::sleep((deadline - now).min(CANCEL_CHECK)).await;
    }
}
