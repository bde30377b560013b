//! Pacing and backoff policy.
//!
//! Pure functions computing how long to wait between requests and after
//! failures. The engine never sleeps directly; it hands these durations to
//! a [`Sleeper`], which the binary backs with `tokio::time::sleep`.
//!
//! | Function | Used for |
//! |----------|----------|
//! | [`jittered_delay`] | Between pages and between targets |
//! | [`backoff`] | After a transient source failure |
//! | [`flood_wait_delay`] | After an explicit flood-wait signal |

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

/// Base delay for the first backoff attempt.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Upper bound on the exponential part of a backoff delay.
pub const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Suspends the current task for a duration.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Pacing delay chosen uniformly in `[min_ms, max_ms]`.
///
/// Equal bounds return that exact value. The result never exceeds `max_ms`.
pub fn jittered_delay(min_ms: u64, max_ms: u64) -> Duration {
    if min_ms >= max_ms {
        return Duration::from_millis(max_ms);
    }
    let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
    Duration::from_millis(ms)
}

/// Exponential backoff for a 1-based `attempt` with the default base and cap.
pub fn backoff(attempt: u32) -> Duration {
    backoff_with(attempt, BACKOFF_BASE, BACKOFF_CAP)
}

/// `min(cap, base * 2^(attempt-1))` plus up to 25% of that value as jitter.
pub fn backoff_with(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let exp = base
        .checked_mul(1u32 << exponent)
        .map_or(cap, |d| d.min(cap));
    let jitter = rand::thread_rng().gen_range(0.0..=0.25);
    exp + exp.mul_f64(jitter)
}

/// Mandatory wait signalled by the source plus 0.5–2s of jitter.
pub fn flood_wait_delay(signaled_seconds: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0.5..=2.0);
    Duration::from_secs(signaled_seconds).saturating_add(Duration::from_secs_f64(jitter))
}
