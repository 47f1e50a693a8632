//! Backend process lifecycle management.
//!
//! Spawns the privileged backend as a child process speaking JSON-RPC over
//! stdio, performs the `initialize` handshake, forwards its stderr into the
//! log, and shuts it down gracefully.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};

use super::errors::BridgeError;
use super::transport::{StdioTransport, Transport};
use super::types::{BackendInfo, INITIALIZE, SHUTDOWN};
use crate::config::BackendConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

// ─── BackendProcess ──────────────────────────────────────────────────────────

/// A running backend process with its transport.
pub struct BackendProcess {
    /// Human-readable backend name.
    pub name: String,
    /// Identity reported by the handshake.
    pub info: BackendInfo,
    process: Child,
    transport: Arc<StdioTransport>,
}

impl BackendProcess {
    /// Shared transport for building a `Bridge`.
    pub fn transport(&self) -> Arc<StdioTransport> {
        Arc::clone(&self.transport)
    }

    /// Check if the backend process is still running.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(None))
    }

    /// Attempt to gracefully shut down the backend.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.transport.notify(SHUTDOWN, None).await {
            tracing::debug!(backend = %self.name, error = %e, "shutdown notification not delivered");
        }

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.process.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(backend = %self.name, %status, "backend exited");
            }
            _ => {
                tracing::warn!(backend = %self.name, "backend did not exit in time, killing");
                let _ = self.process.kill().await;
            }
        }
    }
}

// ─── Spawning ────────────────────────────────────────────────────────────────

/// Spawn the backend process and perform the initialization handshake.
pub async fn spawn_backend(name: &str, config: &BackendConfig) -> Result<BackendProcess, BridgeError> {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    if let Some(dir) = &config.cwd {
        cmd.current_dir(dir);
    }

    // Windows: prevent console window from appearing for the child
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| BridgeError::SpawnFailed {
        name: name.to_string(),
        reason: format!("{}: {e}", config.command),
    })?;

    let stdin = child.stdin.take().ok_or(BridgeError::SpawnFailed {
        name: name.to_string(),
        reason: "failed to capture stdin".into(),
    })?;

    let stdout = child.stdout.take().ok_or(BridgeError::SpawnFailed {
        name: name.to_string(),
        reason: "failed to capture stdout".into(),
    })?;

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_stderr(name.to_string(), stderr));
    }

    let transport = Arc::new(StdioTransport::new(name, stdin, stdout));

    let info = match tokio::time::timeout(INIT_TIMEOUT, initialize(&transport)).await {
        Ok(Ok(info)) => info,
        Ok(Err(e)) => {
            let _ = child.kill().await;
            return Err(BridgeError::InitFailed {
                name: name.to_string(),
                reason: e.to_string(),
            });
        }
        Err(_) => {
            let _ = child.kill().await;
            return Err(BridgeError::InitFailed {
                name: name.to_string(),
                reason: format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs()),
            });
        }
    };

    tracing::info!(
        backend = %name,
        reported_name = %info.name,
        version = info.version.as_deref().unwrap_or("unknown"),
        operations = ?info.operations,
        "backend initialized"
    );

    Ok(BackendProcess {
        name: name.to_string(),
        info,
        process: child,
        transport,
    })
}

/// Perform the initialization handshake.
async fn initialize(transport: &StdioTransport) -> Result<BackendInfo, BridgeError> {
    let result = transport
        .request(INITIALIZE, serde_json::json!({}))
        .await?;

    serde_json::from_value(result).map_err(|e| BridgeError::DecodeFailed {
        operation: INITIALIZE.to_string(),
        reason: e.to_string(),
    })
}

/// Copy the backend's stderr into the log, one event per line.
async fn forward_stderr(name: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                tracing::info!(target: "postdesk::backend", backend = %name, "{}", line.trim_end());
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(backend = %name, error = %e, "stopped reading backend stderr");
                break;
            }
        }
    }
}
