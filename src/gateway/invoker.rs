use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, warn};

use super::{Capability, FailureKind, GatewayError, KeyPool, ProviderError, RetryDecision, RetryPolicy};

/// One external AI service reachable with any key from a pool.
#[async_trait]
pub trait Provider: Send + Sync {
    type Request: Send + Sync;
    type Response: Send;

    fn capability(&self) -> Capability;

    /// Perform exactly one call with `key`. Implementations classify their own
    /// failures; timeouts are applied by the invoker.
    async fn send(&self, key: &str, request: &Self::Request) -> Result<Self::Response, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    TransientError,
    FatalError,
}

impl From<FailureKind> for AttemptOutcome {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::RateLimited => AttemptOutcome::RateLimited,
            FailureKind::Transient => AttemptOutcome::TransientError,
            FailureKind::Fatal => AttemptOutcome::FatalError,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvocationAttempt {
    pub key_index: usize,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

/// A successful call: the provider's response plus the key that served it.
/// Callers keep `key_index` and pass it back as the next start index.
#[derive(Debug)]
pub struct Invocation<R> {
    pub response: R,
    pub key_index: usize,
    pub attempts: Vec<InvocationAttempt>,
}

/// Executes one logical call by rotating through a key pool.
pub struct ResilientInvoker<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    provider: Arc<dyn Provider<Request = Req, Response = Resp>>,
    pool: Arc<KeyPool>,
    policy: RetryPolicy,
}

impl<Req, Resp> ResilientInvoker<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    pub fn new(
        provider: Arc<dyn Provider<Request = Req, Response = Resp>>,
        pool: Arc<KeyPool>,
        policy: RetryPolicy,
    ) -> Self {
        Self { provider, pool, policy }
    }

    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn invoke(&self, request: &Req, start_index: Option<usize>) -> Result<Invocation<Resp>, GatewayError> {
        self.invoke_with(request, start_index, &self.policy).await
    }

    /// Same as [`invoke`](Self::invoke) with a call-specific policy, e.g. the
    /// longer attempt timeout used for analytics scoring.
    pub async fn invoke_with(
        &self,
        request: &Req,
        start_index: Option<usize>,
        policy: &RetryPolicy,
    ) -> Result<Invocation<Resp>, GatewayError> {
        let capability = self.provider.capability();
        if self.pool.is_empty() {
            return Err(GatewayError::EmptyPool(capability));
        }

        let start = self.pool.start_index(start_index);
        let max_attempts = policy.attempts_for(self.pool.len());
        let mut attempts = Vec::with_capacity(max_attempts);
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..max_attempts {
            let key_index = self.pool.rotate(start, attempt);
            let key = match self.pool.key(key_index) {
                Some(key) => key,
                None => continue,
            };

            debug!("{} attempt {}/{} using key #{}", capability, attempt + 1, max_attempts, key_index);
            let started_at = Instant::now();

            let result = match tokio::time::timeout(policy.attempt_timeout, self.provider.send(key, request)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timed_out(policy.attempt_timeout)),
            };
            let latency = started_at.elapsed();

            match result {
                Ok(response) => {
                    attempts.push(InvocationAttempt {
                        key_index,
                        started_at,
                        outcome: AttemptOutcome::Success,
                        latency,
                    });
                    self.pool.record_success(key_index);
                    debug!("{} key #{} succeeded in {}ms", capability, key_index, latency.as_millis());
                    return Ok(Invocation { response, key_index, attempts });
                }
                Err(err) => {
                    warn!("{} key #{} failed (attempt {}): {}", capability, key_index, attempt + 1, err);
                    attempts.push(InvocationAttempt {
                        key_index,
                        started_at,
                        outcome: err.kind.into(),
                        latency,
                    });

                    match policy.decide(err.kind) {
                        RetryDecision::Abort => {
                            error!("{} request rejected, not rotating further", capability);
                            return Err(GatewayError::Rejected { capability, key_index, error: err });
                        }
                        RetryDecision::Advance { after } => {
                            last_error = Some(err);
                            if !after.is_zero() && attempt + 1 < max_attempts {
                                tokio::time::sleep(after).await;
                            }
                        }
                    }
                }
            }
        }

        error!("All {} {} keys exhausted", attempts.len(), capability);
        Err(GatewayError::Exhausted {
            capability,
            attempts: attempts.len(),
            last: last_error.unwrap_or_else(|| ProviderError::transient("no attempt was made")),
        })
    }
}
