pub mod key_pool;
pub mod retry;
pub mod invoker;
pub mod chat;
pub mod speech;

pub use key_pool::KeyPool;
pub use retry::{classify_http, FailureKind, RetryDecision, RetryPolicy};
pub use invoker::{AttemptOutcome, Invocation, InvocationAttempt, Provider, ResilientInvoker};
pub use chat::{ChatClient, ChatInvoker, ChatMessage, ChatReply, ChatRequest, ChatRole};
pub use speech::{SpeechAudio, SpeechClient, SpeechInvoker, SpeechRequest, VoiceSettings};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of external AI call. Each capability owns its own key pool.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Speech,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Chat => write!(f, "chat"),
            Capability::Speech => write!(f, "speech"),
        }
    }
}

/// One failed call against one key, as reported by a provider.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind} failure: {message}")]
pub struct ProviderError {
    pub kind: FailureKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::RateLimited, status: Some(429), message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Transient, status: None, message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { kind: FailureKind::Fatal, status: None, message: message.into() }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Failure for a non-success HTTP response.
    pub fn from_http(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self { kind: classify_http(status, &body), status: Some(status), message: body }
    }

    pub fn timed_out(timeout: std::time::Duration) -> Self {
        Self::transient(format!("attempt timed out after {}ms", timeout.as_millis()))
    }
}

#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("No API keys configured for {0}")]
    EmptyPool(Capability),
    #[error("All {attempts} {capability} keys exhausted, last error: {last}")]
    Exhausted {
        capability: Capability,
        attempts: usize,
        last: ProviderError,
    },
    #[error("{capability} request rejected by key {key_index}: {error}")]
    Rejected {
        capability: Capability,
        key_index: usize,
        error: ProviderError,
    },
}

impl GatewayError {
    /// Last underlying provider failure, when one was observed.
    pub fn last_error(&self) -> Option<&ProviderError> {
        match self {
            GatewayError::EmptyPool(_) => None,
            GatewayError::Exhausted { last, .. } => Some(last),
            GatewayError::Rejected { error, .. } => Some(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
