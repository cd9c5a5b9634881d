//! Exponential backoff with jitter, used between client connect attempts.

use std::time::Duration;

use rand::Rng;

/// Delay before connect attempt `attempt` (0 is the first try and waits
/// nothing). Doubles from `base_ms`, capped at `max_ms`, plus up to 10%
/// jitter.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let capped = base_ms
        .saturating_mul(2u64.saturating_pow(attempt - 1))
        .min(max_ms);
    let spread = capped / 10;
    let jitter = if spread > 0 {
        rand::thread_rng().gen_range(0..spread)
    } else {
        0
    };
    Duration::from_millis(capped + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_is_immediate() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);
    }

    #[test]
    fn delay_doubles_up_to_the_cap() {
        let second = calculate_backoff(2, 100, 2000).as_millis();
        assert!((200..220).contains(&second));

        let capped = calculate_backoff(12, 100, 1000).as_millis();
        assert!((1000..1100).contains(&capped));
    }
}
