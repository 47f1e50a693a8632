//! Typed call sites for the backend's named operations.
//!
//! Each wrapper builds the parameter bag, issues one call through the
//! `Bridge`, and settles the result. Transport failures and business failures
//! are reported separately and never retried.

pub mod cache;
pub mod posts;

use serde::{Deserialize, Serialize};

use crate::bridge::{Bridge, BridgeError, Envelope, Operation};

pub use cache::{check_redis_connection, CheckRedisConnection};
pub use posts::{
    create_post, delete_post, get_all_posts, update_post, CreatePost, CreatePostRequest,
    DeletePost, DeletePostRequest, GetAllPosts, Post, UpdatePost, UpdatePostRequest,
};

// ─── Parameter Bags ──────────────────────────────────────────────────────────

/// Parameter bag for operations that take none; serializes as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoParams {}

/// Commands taking a request struct receive it under a `payload` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload<T> {
    pub payload: T,
}

// ─── Settlement ──────────────────────────────────────────────────────────────

/// How an enveloped call ended, from the caller's point of view.
#[derive(Debug)]
pub enum CallOutcome<T> {
    /// Round trip succeeded and the envelope said `success`. Data may be absent.
    Completed(Option<T>),
    /// Round trip succeeded but the envelope said `error`.
    Rejected { message: Option<String> },
    /// No envelope was produced.
    Failed(BridgeError),
}

impl<T> CallOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, CallOutcome::Completed(_))
    }

    /// Payload of a completed call.
    pub fn data(self) -> Option<T> {
        match self {
            CallOutcome::Completed(data) => data,
            _ => None,
        }
    }
}

/// Classify an enveloped result and log it on the matching channel.
///
/// Transport failures log at `error`; business failures log at `warn` with the
/// envelope's message. The envelope's status alone decides which path is taken.
pub fn settle<T>(operation: &str, result: Result<Envelope<T>, BridgeError>) -> CallOutcome<T> {
    let envelope = match result {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::error!(
                operation,
                backend_down = e.is_backend_down(),
                error = %e,
                "unexpected error"
            );
            return CallOutcome::Failed(e);
        }
    };

    match envelope.into_result() {
        Ok(data) => {
            tracing::debug!(operation, has_data = data.is_some(), "call completed");
            CallOutcome::Completed(data)
        }
        Err(business) => {
            tracing::warn!(operation, message = %business, "backend reported error");
            CallOutcome::Rejected {
                message: business.message,
            }
        }
    }
}

// ─── greet ───────────────────────────────────────────────────────────────────

/// `greet` answers with a bare string, not an envelope.
pub struct Greet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreetParams {
    pub name: String,
}

impl Operation for Greet {
    const NAME: &'static str = "greet";
    type Params = GreetParams;
    type Output = String;
}

/// Ask the backend for a greeting. Only the transport channel can fail.
pub async fn greet(bridge: &Bridge, name: &str) -> Result<String, BridgeError> {
    let params = GreetParams {
        name: name.to_string(),
    };
    let result = bridge.call::<Greet>(&params).await;
    if let Err(e) = &result {
        tracing::error!(
            operation = Greet::NAME,
            backend_down = e.is_backend_down(),
            error = %e,
            "unexpected error"
        );
    }
    result
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CommandRegistry, LocalTransport};
    use std::sync::Arc;

    #[test]
    fn test_no_params_is_empty_object() {
        assert_eq!(serde_json::to_value(NoParams {}).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_settle_transport_failure() {
        let outcome = settle::<String>(
            "nonexistent_op",
            Err(BridgeError::UnknownOperation {
                name: "nonexistent_op".into(),
            }),
        );
        assert!(matches!(outcome, CallOutcome::Failed(BridgeError::UnknownOperation { .. })));
    }

    #[test]
    fn test_settle_business_failure_without_message() {
        let env = Envelope::<String> {
            status: crate::bridge::Status::Error,
            data: Some("stale".into()),
            message: None,
        };
        match settle("check_redis_connection", Ok(env)) {
            CallOutcome::Rejected { message } => assert!(message.is_none()),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn test_settle_success_without_data() {
        let outcome = settle("delete_post", Ok(Envelope::<()>::empty()));
        assert!(outcome.is_completed());
        assert!(outcome.data().is_none());
    }

    #[tokio::test]
    async fn test_greet_returns_raw_string() {
        let mut registry = CommandRegistry::new("test");
        registry.register("greet", |p: GreetParams| async move {
            Ok::<_, String>(format!("Hello, {}!", p.name))
        });
        let bridge = Bridge::from_transport(LocalTransport::new(Arc::new(registry)));

        assert_eq!(greet(&bridge, "Ada").await.unwrap(), "Hello, Ada!");
    }

    #[tokio::test]
    async fn test_greet_unregistered_rejects() {
        let bridge = Bridge::from_transport(LocalTransport::new(Arc::new(CommandRegistry::new(
            "empty",
        ))));
        let err = greet(&bridge, "Ada").await.unwrap_err();
        assert!(matches!(err, BridgeError::UnknownOperation { .. }));
    }
}
