//! Bounded calls: a per-call deadline and an abandon signal around any transport.
//!
//! `DeadlineTransport` is itself a `Transport`, so a `Bridge` built on top of it
//! exposes the same `invoke` contract. Nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::BridgeError;
use super::transport::Transport;

/// Transport decorator adding a deadline and an abandon signal.
pub struct DeadlineTransport<T> {
    inner: T,
    deadline: Option<Duration>,
    abandon: CancellationToken,
}

impl<T: Transport> DeadlineTransport<T> {
    /// Wrap `inner`. `None` leaves calls unbounded in time.
    pub fn new(inner: T, deadline: Option<Duration>) -> Self {
        Self {
            inner,
            deadline,
            abandon: CancellationToken::new(),
        }
    }

    /// Use an externally owned abandon token (e.g. the application's shutdown token).
    pub fn with_abandon_token(mut self, token: CancellationToken) -> Self {
        self.abandon = token;
        self
    }

    /// Handle that abandons every in-flight and future call when cancelled.
    pub fn abandon_token(&self) -> CancellationToken {
        self.abandon.clone()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }
}

#[async_trait]
impl<T: Transport> Transport for DeadlineTransport<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn request(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        if self.abandon.is_cancelled() {
            return Err(BridgeError::Abandoned {
                operation: operation.to_string(),
            });
        }

        let call = self.inner.request(operation, params);
        let bounded = async {
            match self.deadline {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(result) => result,
                    Err(_) => Err(BridgeError::Timeout {
                        operation: operation.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    }),
                },
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.abandon.cancelled() => {
                tracing::debug!(operation, "call abandoned");
                Err(BridgeError::Abandoned { operation: operation.to_string() })
            }
            result = bounded => result,
        }
    }
}
