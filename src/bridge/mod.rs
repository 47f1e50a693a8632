//! Invocation bridge: typed, single-shot calls from the shell to its backend.
//!
//! This module handles:
//! - The response envelope every enveloped operation resolves to
//! - Issuing named calls with a parameter bag and decoding the one result
//! - JSON-RPC 2.0 over the backend process's stdio, with out-of-order settlement
//! - Deadlines and abandonment layered over any transport
//! - Backend process lifecycle (spawn, handshake, graceful shutdown)
//! - The backend-side registry and line server that answer those calls
//!
//! Transport failures reject a call with `BridgeError`. Business failures
//! arrive as a resolved call whose envelope has `status = error`.

pub mod client;
pub mod deadline;
pub mod envelope;
pub mod errors;
pub mod lifecycle;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use client::{Bridge, Operation};
pub use deadline::DeadlineTransport;
pub use envelope::{BusinessError, Envelope, Status};
pub use errors::BridgeError;
pub use registry::{CommandRegistry, LocalTransport};
pub use transport::{StdioTransport, Transport};
pub use types::BackendInfo;
