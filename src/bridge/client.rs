//! Bridge: the single entry point call sites use to reach the backend.
//!
//! One `Bridge` is built at the application root and passed down; clones
//! share the same transport. The bridge is generic over the wire payload:
//! it neither unwraps nor validates envelopes.

use std::sync::Arc;
use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::BridgeError;
use super::transport::Transport;

// ─── Named Operations ────────────────────────────────────────────────────────

/// A backend operation with its statically expected parameter and result types.
pub trait Operation {
    /// Name the backend registers the operation under.
    const NAME: &'static str;
    type Params: Serialize;
    /// Raw or envelope-wrapped, exactly as the backend returns it.
    type Output: DeserializeOwned;
}

// ─── Bridge ──────────────────────────────────────────────────────────────────

/// Handle for issuing named, single-shot calls to the backend.
#[derive(Clone)]
pub struct Bridge {
    transport: Arc<dyn Transport>,
}

impl Bridge {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub fn from_transport<T: Transport + 'static>(transport: T) -> Self {
        Self::new(Arc::new(transport))
    }

    /// Name of the backend behind this bridge.
    pub fn backend_name(&self) -> &str {
        self.transport.name()
    }

    /// Call `operation` once and decode its result as `T`.
    ///
    /// A null parameter bag is sent as `{}`. The call rejects on an empty or
    /// unknown operation name, any transport failure, or a result that does
    /// not decode into `T`.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<T, BridgeError> {
        if operation.trim().is_empty() {
            return Err(BridgeError::UnknownOperation {
                name: operation.to_string(),
            });
        }

        let params = match params {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other,
        };

        let start = Instant::now();
        let value = self.transport.request(operation, params).await?;
        tracing::debug!(
            backend = %self.transport.name(),
            operation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "call settled"
        );

        serde_json::from_value(value).map_err(|e| BridgeError::DecodeFailed {
            operation: operation.to_string(),
            reason: e.to_string(),
        })
    }

    /// Typed form of [`Bridge::invoke`] for a known operation.
    pub async fn call<O: Operation>(&self, params: &O::Params) -> Result<O::Output, BridgeError> {
        let params = serde_json::to_value(params).map_err(|e| BridgeError::TransportError {
            backend: self.transport.name().to_string(),
            reason: format!("failed to serialize params for '{}': {e}", O::NAME),
        })?;
        self.invoke(O::NAME, params).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::envelope::{Envelope, Status};
    use crate::bridge::registry::{CommandRegistry, LocalTransport};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Name {
        name: String,
    }

    fn bridge() -> Bridge {
        let mut registry = CommandRegistry::new("test");
        registry
            .register("greet", |p: Name| async move {
                Ok::<_, String>(format!("Hello, {}!", p.name))
            })
            .register("check_redis_connection", |_: serde_json::Value| async move {
                Ok::<_, String>(Envelope::<String>::error("connection refused"))
            })
            .register("echo", |p: serde_json::Value| async move { Ok::<_, String>(p) });
        Bridge::from_transport(LocalTransport::new(Arc::new(registry)))
    }

    #[tokio::test]
    async fn test_invoke_raw_result() {
        let greeting: String = bridge()
            .invoke("greet", serde_json::json!({"name": "Ada"}))
            .await
            .unwrap();
        assert_eq!(greeting, "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_invoke_business_error_is_a_resolved_call() {
        let env: Envelope<String> = bridge()
            .invoke("check_redis_connection", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(env.status, Status::Error);
        assert_eq!(env.message.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_invoke_unknown_operation_rejects() {
        let result = bridge()
            .invoke::<Envelope<String>>("nonexistent_op", serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(BridgeError::UnknownOperation { .. })));
    }

    #[tokio::test]
    async fn test_invoke_empty_name_rejects() {
        let result = bridge().invoke::<String>("  ", serde_json::json!({})).await;
        assert!(matches!(result, Err(BridgeError::UnknownOperation { .. })));
    }

    #[tokio::test]
    async fn test_invoke_decode_failure_rejects() {
        // A raw string cannot be read as an envelope.
        let result = bridge()
            .invoke::<Envelope<String>>("greet", serde_json::json!({"name": "Ada"}))
            .await;
        match result {
            Err(BridgeError::DecodeFailed { operation, .. }) => assert_eq!(operation, "greet"),
            other => panic!("expected DecodeFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_invoke_null_params_sent_as_empty_object() {
        let echoed: serde_json::Value = bridge()
            .invoke("echo", serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(echoed, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_concurrent_calls_answer_their_own_input() {
        let bridge = bridge();
        let (a, b) = tokio::join!(
            bridge.invoke::<String>("greet", serde_json::json!({"name": "A"})),
            bridge.invoke::<String>("greet", serde_json::json!({"name": "B"})),
        );
        assert_eq!(a.unwrap(), "Hello, A!");
        assert_eq!(b.unwrap(), "Hello, B!");
    }
}
