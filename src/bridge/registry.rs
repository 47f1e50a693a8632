//! Command registry: name-indexed async handlers on the backend side.
//!
//! Provides:
//! - Typed registration (params deserialized, results serialized)
//! - Dispatch by operation name with JSON-RPC error codes
//! - The built-in `initialize` handshake listing registered operations
//! - `LocalTransport`, which calls a registry in-process

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::errors::BridgeError;
use super::transport::{extract_result, Transport};
use super::types::{error_codes, BackendInfo, JsonRpcError, JsonRpcResponse, INITIALIZE};

// ─── Dispatch Errors ─────────────────────────────────────────────────────────

/// A dispatch failure, carried back to the caller as a JSON-RPC error.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchError {
    pub code: i32,
    pub message: String,
}

impl DispatchError {
    pub fn method_not_found(operation: &str) -> Self {
        Self {
            code: error_codes::METHOD_NOT_FOUND,
            message: format!("Method not found: {operation}"),
        }
    }

    pub fn invalid_params(operation: &str, reason: impl std::fmt::Display) -> Self {
        Self {
            code: error_codes::INVALID_PARAMS,
            message: format!("invalid params for '{operation}': {reason}"),
        }
    }

    pub fn command_failed(message: String) -> Self {
        Self {
            code: error_codes::COMMAND_FAILED,
            message,
        }
    }

    pub fn internal(reason: impl std::fmt::Display) -> Self {
        Self {
            code: error_codes::INTERNAL_ERROR,
            message: reason.to_string(),
        }
    }
}

impl From<DispatchError> for JsonRpcError {
    fn from(err: DispatchError) -> Self {
        JsonRpcError {
            code: err.code,
            message: err.message,
            data: None,
        }
    }
}

// ─── CommandRegistry ─────────────────────────────────────────────────────────

type Handler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<serde_json::Value, DispatchError>> + Send + Sync>;

/// Operations a backend exposes, keyed by name.
pub struct CommandRegistry {
    name: String,
    version: Option<String>,
    handlers: HashMap<String, Handler>,
}

impl CommandRegistry {
    /// Create an empty registry for a backend called `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: None,
            handlers: HashMap::new(),
        }
    }

    /// Set the version reported by the handshake.
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    /// Register an async handler for `operation`.
    ///
    /// The parameter bag is deserialized into `P`; a mismatch is reported as
    /// invalid params without running the handler. A handler `Err` rejects the
    /// call; business failures should be returned as an `Ok` envelope instead.
    pub fn register<P, R, F, Fut>(&mut self, operation: &str, handler: F) -> &mut Self
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let operation_name = operation.to_string();

        let boxed: Handler = Arc::new(move |params: serde_json::Value| {
            let handler = Arc::clone(&handler);
            let operation = operation_name.clone();
            async move {
                let params: P = serde_json::from_value(params)
                    .map_err(|e| DispatchError::invalid_params(&operation, e))?;
                let output = (*handler)(params)
                    .await
                    .map_err(DispatchError::command_failed)?;
                serde_json::to_value(output).map_err(DispatchError::internal)
            }
            .boxed()
        });

        self.handlers.insert(operation.to_string(), boxed);
        self
    }

    /// Backend name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `operation` is registered.
    pub fn contains(&self, operation: &str) -> bool {
        self.handlers.contains_key(operation)
    }

    /// Registered operation names, sorted.
    pub fn operations(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Handshake payload.
    pub fn info(&self) -> BackendInfo {
        BackendInfo {
            name: self.name.clone(),
            version: self.version.clone(),
            operations: self.operations(),
        }
    }

    /// Run the handler registered for `operation`.
    pub async fn dispatch(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        if operation == INITIALIZE {
            return serde_json::to_value(self.info()).map_err(DispatchError::internal);
        }

        let handler = self
            .handlers
            .get(operation)
            .cloned()
            .ok_or_else(|| DispatchError::method_not_found(operation))?;

        tracing::debug!(backend = %self.name, operation, "dispatching");
        (*handler)(params).await
    }
}

// ─── LocalTransport ──────────────────────────────────────────────────────────

/// In-process transport that dispatches straight into a registry.
///
/// Errors map exactly as they would over stdio.
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<CommandRegistry>,
}

impl LocalTransport {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn name(&self) -> &str {
        self.registry.name()
    }

    async fn request(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        let response = match self.registry.dispatch(operation, params).await {
            Ok(value) => JsonRpcResponse::success(0, value),
            Err(err) => JsonRpcResponse::failure(0, err.into()),
        };
        extract_result(operation, response)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
