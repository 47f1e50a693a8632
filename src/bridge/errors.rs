//! Invocation bridge error types.
//!
//! Every variant is a transport-level failure: no envelope was produced.
//! Business failures travel inside a successfully decoded envelope instead.

use thiserror::Error;

/// Errors that reject a bridge call.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The backend process failed to start.
    #[error("failed to spawn backend '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("backend '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// I/O or framing error on the channel to the backend.
    #[error("transport error for backend '{backend}': {reason}")]
    TransportError { backend: String, reason: String },

    /// The backend went away while calls were pending, or before they were sent.
    #[error("backend '{name}' exited: {reason}")]
    BackendExited { name: String, reason: String },

    /// The backend does not expose an operation with this name.
    #[error("unknown operation: '{name}'")]
    UnknownOperation { name: String },

    /// The backend rejected the call instead of producing a value.
    #[error("operation '{operation}' failed [{code}]: {message}")]
    CommandFailed {
        operation: String,
        code: i32,
        message: String,
    },

    /// The result did not deserialize into the caller's declared type.
    #[error("failed to decode result of '{operation}': {reason}")]
    DecodeFailed { operation: String, reason: String },

    /// The call did not settle before its deadline.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// The caller abandoned the call.
    #[error("operation '{operation}' abandoned")]
    Abandoned { operation: String },
}

impl BridgeError {
    /// Whether the backend channel itself is gone and later calls will fail too.
    pub fn is_backend_down(&self) -> bool {
        matches!(
            self,
            BridgeError::SpawnFailed { .. }
                | BridgeError::InitFailed { .. }
                | BridgeError::BackendExited { .. }
        )
    }
}
