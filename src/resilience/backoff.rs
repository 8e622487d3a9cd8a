//! Exponential backoff with optional jitter.

use std::time::Duration;
use rand::Rng;

/// Delay to wait after failed attempt `attempt` (1-based).
///
/// `min(base * 2^(attempt-1), max)`, plus up to `jitter_ratio * delay` of
/// random jitter when `jitter_ratio > 0`.
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter_ratio: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u32.saturating_pow(attempt - 1);
    let capped_delay = base.saturating_mul(exponential_base).min(max);

    if jitter_ratio <= 0.0 || capped_delay.is_zero() {
        return capped_delay;
    }

    let jitter_range = capped_delay.mul_f64(jitter_ratio.min(1.0));
    if jitter_range.is_zero() {
        return capped_delay;
    }
    let jitter = rand::thread_rng().gen_range(Duration::ZERO..jitter_range);
    capped_delay + jitter
}
