//! Retry backoff ladder for failed archive attempts.

use chrono::Duration;
use rand::Rng;

/// Exponent cap: delays stop growing past `2^10` days (~3 years).
pub const MAX_BACKOFF_EXPONENT: u32 = 10;

/// Delay before the next retry after `attempts` consecutive failures:
/// `2^min(attempts, 10)` days with ±10% jitter so batched retries spread out.
#[must_use]
pub fn retry_delay(attempts: i64) -> Duration {
    let exponent = u32::try_from(attempts.max(0))
        .unwrap_or(MAX_BACKOFF_EXPONENT)
        .min(MAX_BACKOFF_EXPONENT);
    let base_days = f64::from(2_u32.pow(exponent));

    let jitter = rand::thread_rng().gen_range(-0.1..=0.1);
    let seconds = base_days * 86_400.0 * (1.0 + jitter);

    #[allow(clippy::cast_possible_truncation)]
    Duration::seconds(seconds as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(attempts: i64) -> (i64, i64) {
        let exponent = attempts.clamp(0, i64::from(MAX_BACKOFF_EXPONENT)) as u32;
        let base = i64::from(2_u32.pow(exponent)) * 86_400;
        (base * 9 / 10, base * 11 / 10)
    }

    #[test]
    fn delay_within_jitter_bounds() {
        for attempts in [1, 2, 3, 5, 10] {
            let (lo, hi) = bounds(attempts);
            for _ in 0..50 {
                let delay = retry_delay(attempts).num_seconds();
                assert!(
                    delay >= lo && delay <= hi,
                    "attempts={attempts} delay={delay} outside [{lo}, {hi}]"
                );
            }
        }
    }

    #[test]
    fn exponent_is_capped() {
        let (lo, hi) = bounds(10);
        for attempts in [10, 11, 100, i64::MAX] {
            let delay = retry_delay(attempts).num_seconds();
            assert!(delay >= lo && delay <= hi);
        }
    }

    #[test]
    fn ladder_doubles() {
        // Midpoints double attempt over attempt: ~1, 2, 4 days.
        let one = retry_delay(0).num_seconds();
        assert!(one >= 86_400 * 9 / 10 && one <= 86_400 * 11 / 10);
        let two = retry_delay(1).num_seconds();
        assert!(two >= 2 * 86_400 * 9 / 10 && two <= 2 * 86_400 * 11 / 10);
    }
}
