//! Merging pull requests under transient merge conflicts.

use crate::forge::{Forge, ForgeResult};
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Capped exponential backoff with jitter.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Growth factor of the delay per attempt.
    pub multiplier: f64,
    /// Fraction of the delay that is randomized in both directions.
    pub randomization_factor: f64,
    /// Upper bound of a single delay, before jitter.
    pub max_interval: Duration,
    /// Retrying stops once this much time has passed since the first attempt.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            randomization_factor: 0.5,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(15 * 60),
        }
    }
}

/// A schedule of delays between attempts.
pub trait BackoffPolicy {
    /// The delay before retry number `attempt` (starting at 0), without jitter.
    fn delay_for_attempt(&self, attempt: u32) -> Duration;

    /// The delay before retry number `attempt`, with jitter applied.
    fn jittered_delay(&self, attempt: u32) -> Duration;
}

impl BackoffPolicy for RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.delay_for_attempt(attempt).as_secs_f64();
        let spread = base * self.randomization_factor;
        if spread <= 0.0 {
            return Duration::from_secs_f64(base);
        }
        let jittered = rand::rng().random_range((base - spread)..=(base + spread));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Merges pull request `number`, retrying while GitHub reports the transient "try the merge again" conflict.
///
/// ## Takes
/// - `forge` - The repository the PR lives in.
/// - `number` - The PR number.
/// - `policy` - The backoff schedule.
///
/// ## Returns
/// - `Ok(())` once the merge succeeds.
/// - `Err(_)` on the first permanent failure, or the last transient failure once `max_elapsed` has passed.
pub async fn merge_with_retry<P: BackoffPolicy + ?Sized>(
    forge: &dyn Forge,
    number: u64,
    policy: &P,
    max_elapsed: Duration,
) -> ForgeResult<()> {
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        match forge.merge_pull_request(number).await {
            Ok(()) => {
                info!(pr = number, attempts = attempt + 1, "Merged pull request");
                return Ok(());
            }
            Err(e) if e.is_retryable_merge() => {
                let delay = policy.jittered_delay(attempt);
                if started.elapsed() + delay > max_elapsed {
                    warn!(pr = number, error = %e, "Giving up on merge, retry budget exhausted");
                    return Err(e);
                }
                warn!(pr = number, error = %e, delay_ms = delay.as_millis() as u64, "Failed to merge PR, transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(pr = number, error = %e, "Failed to merge PR, permanent error");
                return Err(e);
            }
        }
    }
}

/// Merges pull request `number` under the default [RetryPolicy].
pub async fn merge_pull_request(forge: &dyn Forge, number: u64) -> ForgeResult<()> {
    let policy = RetryPolicy::default();
    merge_with_retry(forge, number, &policy, policy.max_elapsed).await
}
