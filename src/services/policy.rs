//! Retry/rate-limit policy for provider calls.
//!
//! Pure decision logic: no I/O, no clock. The fetch worker feeds it one
//! classified attempt at a time and acts on the returned `Decision`.

use std::time::Duration;

use crate::services::weatherapi::WeatherPayload;

/// Default number of provider calls per ward.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second attempt; doubled for each following one.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Upper bound on any single backoff delay, including `Retry-After` hints.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Classified result of a single provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptResult {
    Success(WeatherPayload),
    /// Connection failure, timeout, truncated body.
    NetworkError(String),
    /// HTTP 429, with the provider's `Retry-After` hint when present.
    RateLimited { retry_after: Option<Duration> },
    /// HTTP 5xx.
    ServerError { status: u16 },
    /// Any other non-success status: bad query, unknown location, auth or quota.
    ClientError { status: u16, message: String },
    /// HTTP 200 whose body is not a forecast payload.
    Malformed(String),
}

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Accept(WeatherPayload),
    Retry { delay: Duration, reason: String },
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)`, capped at `max_delay`. Non-decreasing in `attempt`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide the next step after attempt number `attempt` (1-based).
    pub fn decide(&self, attempt: u32, result: AttemptResult) -> Decision {
        let (reason, hint) = match result {
            AttemptResult::Success(payload) => return Decision::Accept(payload),
            AttemptResult::ClientError { status, message } => {
                return Decision::Fail(format!("HTTP {}: {}", status, message));
            }
            AttemptResult::Malformed(msg) => {
                return Decision::Fail(format!("malformed payload: {}", msg));
            }
            AttemptResult::NetworkError(msg) => (format!("network error: {}", msg), None),
            AttemptResult::RateLimited { retry_after } => {
                ("rate limited (HTTP 429)".to_string(), retry_after)
            }
            AttemptResult::ServerError { status } => (format!("HTTP {}", status), None),
        };

        if attempt >= self.max_attempts {
            return Decision::Fail(format!("{} after {} attempts", reason, attempt));
        }

        let mut delay = self.backoff(attempt);
        if let Some(hint) = hint {
            delay = delay.max(hint.min(self.max_delay));
        }
        Decision::Retry { delay, reason }
    }
}
