//! Response envelope shared by every enveloped operation.
//!
//! `status` is the only discriminant. `data` and `message` may each be null
//! in either outcome, so nothing here inspects them to decide success.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Outcome tag of an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Uniform success/error wrapper around an operation's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub data: Option<T>,
    pub message: Option<String>,
}

/// A well-formed envelope that reported `status = error`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .message.as_deref().unwrap_or("backend reported an error without a message"))]
pub struct BusinessError {
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Successful envelope carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            status: Status::Success,
            data: Some(data),
            message: None,
        }
    }

    /// Successful envelope with no payload.
    pub fn empty() -> Self {
        Self {
            status: Status::Success,
            data: None,
            message: None,
        }
    }

    /// Error envelope with a diagnostic message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Interpret the envelope by its status.
    ///
    /// Success yields the (possibly absent) payload; error yields the
    /// (possibly absent) message and drops any payload.
    pub fn into_result(self) -> Result<Option<T>, BusinessError> {
        match self.status {
            Status::Success => Ok(self.data),
            Status::Error => Err(BusinessError {
                message: self.message,
            }),
        }
    }
}
