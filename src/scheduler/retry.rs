//! Retry policy with exponential backoff for transient transfer failures.
//!
//! A failed transfer is classified into a [`FailureType`]; the
//! [`RetryPolicy`] then decides whether to retry and after what delay.
//! Delays grow exponentially with a random jitter and are capped, so a
//! burst of simultaneous failures does not hammer the server in lockstep.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::error::TransferError;
use crate::decrypt::DecryptError;

/// Default maximum attempts per task (including the initial attempt).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay for exponential backoff.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays.
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a transfer failure for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry: timeouts, 5xx,
    /// connection drops, corrupt segment bodies.
    Transient,

    /// Failure that will not succeed regardless of retries: 404, local
    /// filesystem errors, missing content keys.
    Permanent,

    /// The session was rejected (401/403). Retrying with the same
    /// credentials would not help.
    NeedsAuth,

    /// Server rate limiting (HTTP 429). Retried with backoff, honoring
    /// the `Retry-After` header when present.
    RateLimited,
}

/// Decision on whether to retry a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Retry configuration: attempt ceiling plus backoff shape.
///
/// Delay formula: `min(base_delay * multiplier^(attempt-1), max_delay) + jitter`.
/// With defaults that gives roughly 1s, 2s, 4s.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings. `max_attempts` is clamped to
    /// at least 1.
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f32,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
        }
    }

    /// Creates a policy with a custom attempt ceiling, defaults otherwise.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the configured attempt ceiling.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after the failure of `attempt` (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent failure - retry would not help".to_string(),
                };
            }
            FailureType::NeedsAuth => {
                return RetryDecision::DoNotRetry {
                    reason: "session rejected - retry with the same credentials would not help"
                        .to_string(),
                };
            }
            FailureType::Transient | FailureType::RateLimited => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// `min(base * multiplier^(attempt-1), max) + jitter`.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);

        let exponent = f64::from(attempt - 1);
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + self.calculate_jitter()
    }

    /// Random jitter in `0..=MAX_JITTER` to spread simultaneous retries.
    fn calculate_jitter(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a transfer error into a failure type.
///
/// Timeouts, most network errors, 5xx, and corrupt segment bodies are
/// transient. 401/403 need auth. Missing content keys, 404-class statuses,
/// TLS failures, and local I/O are permanent.
#[instrument]
pub fn classify_error(error: &TransferError) -> FailureType {
    match error {
        TransferError::HttpStatus { status, .. } => classify_http_status(*status),

        TransferError::Timeout { .. } => FailureType::Transient,

        TransferError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        // A padding failure usually means the body was corrupted in
        // transit; a fresh fetch-and-decrypt may succeed. A missing key
        // never will.
        TransferError::Decrypt(DecryptError::KeyNotFound { .. }) => FailureType::Permanent,
        TransferError::Decrypt(_) => FailureType::Transient,

        TransferError::Assemble(_) | TransferError::Io { .. } => FailureType::Permanent,

        TransferError::Cancelled => FailureType::Permanent,
    }
}

#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        400 => FailureType::Permanent,
        401 => FailureType::NeedsAuth,
        403 => FailureType::NeedsAuth,
        404 => FailureType::Permanent,
        408 => FailureType::Transient,
        410 => FailureType::Permanent,
        429 => FailureType::RateLimited,
        451 => FailureType::Permanent,

        500 => FailureType::Transient,
        502 => FailureType::Transient,
        503 => FailureType::Transient,
        504 => FailureType::Transient,

        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,

        _ => FailureType::Permanent,
    }
}

/// Checks if a reqwest error is a TLS/certificate error.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let error_string = error.to_string().to_lowercase();
    error_string.contains("certificate")
        || error_string.contains("tls")
        || error_string.contains("ssl")
        || error_string.contains("handshake")
}

/// Parses a `Retry-After` header value into a delay.
///
/// Supports both the delay-seconds form and the HTTP-date form.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = httpdate::parse_http_date(value).ok()?;
    when.duration_since(std::time::SystemTime::now()).ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn http_error(status: u16) -> TransferError {
        TransferError::HttpStatus {
            url: "http://example.com/seg-0.ts".to_string(),
            status,
            retry_after: None,
        }
    }

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(32));
    }

    #[test]
    fn test_retry_policy_max_attempts_minimum_is_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(32), 2.0);
        let delay1 = policy.calculate_delay(1);
        let delay2 = policy.calculate_delay(2);
        let delay3 = policy.calculate_delay(3);

        assert!(delay1 >= Duration::from_secs(1) && delay1 <= Duration::from_millis(1500));
        assert!(delay2 >= Duration::from_secs(2) && delay2 <= Duration::from_millis(2500));
        assert!(delay3 >= Duration::from_secs(4) && delay3 <= Duration::from_millis(4500));
    }

    #[test]
    fn test_delay_respects_max_cap() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delay = policy.calculate_delay(6);
        assert!(delay >= Duration::from_secs(5));
        assert!(delay <= Duration::from_millis(5500));
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            assert!(policy.calculate_jitter() <= MAX_JITTER);
        }
    }

    #[test]
    fn test_classify_5xx_transient() {
        for status in [500, 502, 503, 504] {
            assert_eq!(classify_error(&http_error(status)), FailureType::Transient);
        }
    }

    #[test]
    fn test_classify_auth_statuses() {
        assert_eq!(classify_error(&http_error(401)), FailureType::NeedsAuth);
        assert_eq!(classify_error(&http_error(403)), FailureType::NeedsAuth);
    }

    #[test]
    fn test_classify_404_permanent() {
        assert_eq!(classify_error(&http_error(404)), FailureType::Permanent);
    }

    #[test]
    fn test_classify_429_rate_limited() {
        assert_eq!(classify_error(&http_error(429)), FailureType::RateLimited);
    }

    #[test]
    fn test_classify_timeout_transient() {
        let error = TransferError::Timeout {
            url: "http://example.com".to_string(),
        };
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_missing_key_permanent() {
        let error = TransferError::Decrypt(DecryptError::KeyNotFound {
            key_id: "kid-1".to_string(),
        });
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_classify_bad_padding_transient() {
        let error = TransferError::Decrypt(DecryptError::BadPadding {
            key_id: "kid-1".to_string(),
        });
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_io_permanent() {
        let error = TransferError::Io {
            path: "/out/file.ts".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Permanent, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    #[test]
    fn test_should_retry_needs_auth_does_not_retry() {
        let policy = RetryPolicy::default();
        match policy.should_retry(FailureType::NeedsAuth, 1) {
            RetryDecision::DoNotRetry { reason } => assert!(reason.contains("session")),
            other => panic!("expected DoNotRetry, got {other:?}"),
        }
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { attempt: 2, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("7"), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::from_secs(0)));
    }

    #[test]
    fn test_parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_past_http_date() {
        // A date in the past yields no delay at all.
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
