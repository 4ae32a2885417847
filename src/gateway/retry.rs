use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How a failed attempt against one key should be treated.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// HTTP 429 or a provider quota signal. Back off, then try the next key.
    RateLimited,
    /// Timeouts, network errors, 5xx, bad credentials. Next key immediately.
    Transient,
    /// The request itself is unacceptable; no other key will fix it.
    Fatal,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::RateLimited => write!(f, "rate_limited"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Fatal => write!(f, "fatal"),
        }
    }
}

/// Map an HTTP status and response body to a failure kind.
pub fn classify_http(status: u16, body: &str) -> FailureKind {
    if status == 429 {
        return FailureKind::RateLimited;
    }

    let body_lower = body.to_lowercase();
    if body_lower.contains("rate_limit_exceeded") || body_lower.contains("quota_exceeded") {
        return FailureKind::RateLimited;
    }

    match status {
        400 | 422 => FailureKind::Fatal,
        _ => FailureKind::Transient,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Move on to the next key after waiting `after`.
    Advance { after: Duration },
    /// Stop rotating and surface the failure.
    Abort,
}

/// Retry policy shared by the chat and speech invokers.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound on attempts per call; never exceeds the pool size.
    pub max_attempts: Option<usize>,
    pub attempt_timeout: Duration,
    pub rate_limit_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            attempt_timeout: Duration::from_secs(10),
            rate_limit_backoff: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempt_timeout: Duration, rate_limit_backoff: Duration) -> Self {
        Self {
            attempt_timeout,
            rate_limit_backoff,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Number of keys a single call may try.
    pub fn attempts_for(&self, pool_len: usize) -> usize {
        match self.max_attempts {
            Some(max) => max.min(pool_len),
            None => pool_len,
        }
    }

    pub fn decide(&self, kind: FailureKind) -> RetryDecision {
        match kind {
            FailureKind::RateLimited => RetryDecision::Advance { after: self.rate_limit_backoff },
            FailureKind::Transient => RetryDecision::Advance { after: Duration::ZERO },
            FailureKind::Fatal => RetryDecision::Abort,
        }
    }
}
