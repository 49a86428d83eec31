//! Retry-After parsing and backoff for throttled or failing requests

use std::time::Duration;

use tracing::warn;

/// Delay used when a 429 carries no usable Retry-After header
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff on 5xx responses
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Upper bound for any single wait
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Parses a `Retry-After` header value.
///
/// Accepts delta-seconds or an HTTP-date. Values that cannot be parsed, or
/// dates in the past, yield `default`. Results are capped at one minute.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds).min(MAX_WAIT);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(wait) = diff.to_std() {
            return wait.min(MAX_WAIT);
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

/// Exponential backoff for the given zero-based attempt
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    BACKOFF_BASE.saturating_mul(factor).min(MAX_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_delta_seconds() {
        assert_eq!(
            parse_retry_after("12", DEFAULT_RETRY_AFTER),
            Duration::from_secs(12)
        );
        assert_eq!(
            parse_retry_after(" 0 ", DEFAULT_RETRY_AFTER),
            Duration::ZERO
        );
    }

    #[test]
    fn caps_long_waits() {
        assert_eq!(parse_retry_after("86400", DEFAULT_RETRY_AFTER), MAX_WAIT);
    }

    #[test]
    fn falls_back_on_garbage() {
        assert_eq!(
            parse_retry_after("soon", Duration::from_secs(7)),
            Duration::from_secs(7)
        );
    }

    #[test]
    fn past_http_date_uses_default() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", Duration::from_secs(3)),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(0), Duration::from_millis(500));
        assert_eq!(backoff_delay(1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(20), MAX_WAIT);
    }
}
