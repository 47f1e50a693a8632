//! Serve a `CommandRegistry` over a line-delimited JSON-RPC stream.
//!
//! Each request is dispatched on its own task and answered through a single
//! writer task, so a slow operation never holds up a fast one. The loop ends
//! on a `shutdown` notification or when the input stream closes; responses
//! for requests already accepted are still written.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::registry::CommandRegistry;
use super::types::{JsonRpcRequest, JsonRpcResponse, SHUTDOWN};

/// Capacity of the outgoing response queue.
const RESPONSE_QUEUE: usize = 64;

/// Serve requests read from `reader`, writing responses to `writer`.
pub async fn serve<R, W>(
    registry: Arc<CommandRegistry>,
    reader: R,
    writer: W,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (tx, rx) = mpsc::channel::<JsonRpcResponse>(RESPONSE_QUEUE);
    let writer_task = tokio::spawn(write_responses(writer, rx));

    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let request = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(backend = %registry.name(), error = %e, "discarding malformed request line");
                continue;
            }
        };

        let Some(id) = request.id else {
            if request.method == SHUTDOWN {
                tracing::info!(backend = %registry.name(), "shutdown requested");
                break;
            }
            tracing::debug!(method = %request.method, "ignoring notification");
            continue;
        };

        let registry = Arc::clone(&registry);
        let tx = tx.clone();
        tokio::spawn(async move {
            let params = request
                .params
                .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));
            let response = match registry.dispatch(&request.method, params).await {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(err) => {
                    tracing::debug!(
                        operation = %request.method,
                        code = err.code,
                        message = %err.message,
                        "dispatch failed"
                    );
                    JsonRpcResponse::failure(id, err.into())
                }
            };
            let _ = tx.send(response).await;
        });
    }

    drop(tx);
    writer_task.await.map_err(std::io::Error::other)?
}

async fn write_responses<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<JsonRpcResponse>,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(response) = rx.recv().await {
        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
