//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with the backend process:
//! - Writing JSON-RPC requests to its stdin from a single writer task
//! - Reading JSON-RPC responses from its stdout on a background task
//! - Line-delimited JSON protocol (one JSON object per line)
//!
//! Responses are routed to their caller by request id, so any number of
//! calls can be in flight and they may settle in any order. Callers only
//! enqueue whole frames, so a call dropped mid-send never leaves a partial
//! line on the backend's stdin.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::errors::BridgeError;
use super::types::{error_codes, JsonRpcRequest, JsonRpcResponse};

// ─── Transport Seam ──────────────────────────────────────────────────────────

/// One request, one settlement, against some backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Backend name used in diagnostics.
    fn name(&self) -> &str;

    /// Send `operation` with `params` and wait for its single result.
    async fn request(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn request(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        (**self).request(operation, params).await
    }
}

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Pending Calls ───────────────────────────────────────────────────────────

#[derive(Default)]
struct Pending {
    /// Set once the reader stops; the reason every later call is rejected with.
    closed: Option<String>,
    waiters: HashMap<u64, oneshot::Sender<JsonRpcResponse>>,
}

type SharedPending = Arc<std::sync::Mutex<Pending>>;

fn lock_pending(pending: &SharedPending) -> std::sync::MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Removes a waiter when its call finishes or its future is dropped.
struct PendingSlot<'a> {
    id: u64,
    pending: &'a SharedPending,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).waiters.remove(&self.id);
    }
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// Capacity of the outgoing frame queue.
const FRAME_QUEUE: usize = 64;

/// One serialized message, newline included, and where to report its write.
struct Frame {
    line: String,
    written: oneshot::Sender<std::io::Result<()>>,
}

/// Bi-directional JSON-RPC transport over a pair of byte streams
/// (normally the backend child's stdin and stdout).
pub struct StdioTransport {
    backend: String,
    frames: mpsc::Sender<Frame>,
    pending: SharedPending,
    reader_task: JoinHandle<()>,
}

impl StdioTransport {
    /// Create a new transport and start its reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime. The writer task ends once
    /// the transport is dropped and its queue has drained.
    pub fn new<W, R>(backend: &str, writer: W, reader: R) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        let pending: SharedPending = Arc::default();
        let reader_task = tokio::spawn(read_responses(
            backend.to_string(),
            BufReader::new(reader),
            Arc::clone(&pending),
        ));

        let (frames, rx) = mpsc::channel(FRAME_QUEUE);
        tokio::spawn(write_frames(backend.to_string(), writer, rx));

        Self {
            backend: backend.to_string(),
            frames,
            pending,
            reader_task,
        }
    }

    /// Number of calls currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        lock_pending(&self.pending).waiters.len()
    }

    /// Whether the response stream has ended.
    pub fn is_closed(&self) -> bool {
        lock_pending(&self.pending).closed.is_some()
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), BridgeError> {
        self.write_message(&JsonRpcRequest::notification(method, params))
            .await
    }

    async fn write_message(&self, message: &JsonRpcRequest) -> Result<(), BridgeError> {
        let mut json = serde_json::to_string(message).map_err(|e| BridgeError::TransportError {
            backend: self.backend.clone(),
            reason: format!("failed to serialize request: {e}"),
        })?;
        json.push('\n');

        // Once queued, the frame is written whole even if this call is dropped.
        let (written, done) = oneshot::channel();
        self.frames
            .send(Frame { line: json, written })
            .await
            .map_err(|_| self.writer_stopped())?;

        match done.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BridgeError::TransportError {
                backend: self.backend.clone(),
                reason: format!("failed to write to stdin: {e}"),
            }),
            Err(_) => Err(self.writer_stopped()),
        }
    }

    fn writer_stopped(&self) -> BridgeError {
        BridgeError::TransportError {
            backend: self.backend.clone(),
            reason: "stdin writer stopped".to_string(),
        }
    }

    fn exited(&self) -> BridgeError {
        let reason = lock_pending(&self.pending)
            .closed
            .clone()
            .unwrap_or_else(|| "response channel dropped".to_string());
        BridgeError::BackendExited {
            name: self.backend.clone(),
            reason,
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &str {
        &self.backend
    }

    async fn request(
        &self,
        operation: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BridgeError> {
        let id = next_request_id();

        // Register before writing so a fast response cannot be missed.
        let rx = {
            let mut pending = lock_pending(&self.pending);
            if let Some(reason) = &pending.closed {
                return Err(BridgeError::BackendExited {
                    name: self.backend.clone(),
                    reason: reason.clone(),
                });
            }
            let (tx, rx) = oneshot::channel();
            pending.waiters.insert(id, tx);
            rx
        };
        let _slot = PendingSlot {
            id,
            pending: &self.pending,
        };

        self.write_message(&JsonRpcRequest::new(id, operation, Some(params)))
            .await?;

        let response = rx.await.map_err(|_| self.exited())?;
        extract_result(operation, response)
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Write queued frames in order, each one completely, and report each result.
async fn write_frames<W>(backend: String, mut writer: W, mut frames: mpsc::Receiver<Frame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let result = async {
            writer.write_all(frame.line.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = &result {
            tracing::warn!(backend = %backend, error = %e, "failed to write request frame");
        }
        let _ = frame.written.send(result);
    }
}

/// Read response lines and hand each to the waiter with the matching id.
///
/// Lines that are not JSON-RPC responses (stray backend output) are skipped.
/// When the stream ends, all waiters are dropped so their calls reject.
async fn read_responses<R>(backend: String, mut reader: BufReader<R>, pending: SharedPending)
where
    R: AsyncRead + Unpin,
{
    let mut line_buf = String::new();

    let reason = loop {
        line_buf.clear();
        match reader.read_line(&mut line_buf).await {
            Ok(0) => break "backend stdout closed (process may have exited)".to_string(),
            Ok(_) => {}
            Err(e) => break format!("failed to read from stdout: {e}"),
        }

        let trimmed = line_buf.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
            Ok(resp) => {
                let waiter = lock_pending(&pending).waiters.remove(&resp.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => {
                        tracing::debug!(
                            backend = %backend,
                            id = resp.id,
                            "response for a call that is no longer waiting"
                        );
                    }
                }
            }
            Err(_) => {
                tracing::trace!(backend = %backend, line = trimmed, "skipping non-response line");
            }
        }
    };

    tracing::info!(backend = %backend, reason = %reason, "backend response stream ended");

    let mut guard = lock_pending(&pending);
    guard.closed = Some(reason);
    guard.waiters.clear();
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `BridgeError`.
///
/// A response with neither `result` nor `error` is a null result.
pub fn extract_result(
    operation: &str,
    response: JsonRpcResponse,
) -> Result<serde_json::Value, BridgeError> {
    if let Some(err) = response.error {
        return Err(match err.code {
            error_codes::METHOD_NOT_FOUND => BridgeError::UnknownOperation {
                name: operation.to_string(),
            },
            code => BridgeError::CommandFailed {
                operation: operation.to_string(),
                code,
                message: err.message,
            },
        });
    }

    Ok(response.result.unwrap_or(serde_json::Value::Null))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
