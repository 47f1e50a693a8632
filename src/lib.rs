pub mod app;
pub mod backend;
pub mod bridge;
pub mod commands;
pub mod config;
pub mod logging;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;

use app::{Action, App};
use bridge::lifecycle::spawn_backend;
use bridge::{Bridge, DeadlineTransport};
use config::ShellConfig;

pub use logging::init_stderr_tracing;

/// Async mutex for state that is held across `.await`.
pub type TokioMutex<T> = tokio::sync::Mutex<T>;

/// How long in-flight actions may finish after `quit` before they are abandoned.
const QUIT_GRACE: Duration = Duration::from_secs(2);

/// How long the runtime waits for stray blocking tasks on exit.
const RUNTIME_SHUTDOWN: Duration = Duration::from_millis(500);

/// Return the platform-standard data directory for Postdesk.
///
/// - macOS: `~/Library/Application Support/com.postdesk.app/`
/// - Windows: `{FOLDERID_RoamingAppData}\com.postdesk.app\`
/// - Linux: `$XDG_DATA_HOME/com.postdesk.app/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.postdesk/` only if none of the above can be resolved.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("com.postdesk.app");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".postdesk")
}

// ─── Shell ───────────────────────────────────────────────────────────────────

/// Run the shell: spawn the backend, then serve actions read from stdin
/// until `quit` or end of input.
///
/// One current-thread runtime drives everything; each action runs as its own
/// task so calls overlap.
pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    // The log location comes from the config, so load it before tracing
    // starts and report how it was loaded afterwards.
    let (config, source) = ShellConfig::resolve(config_path);
    logging::init_shell_tracing(&config.log);
    source.log(&config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(shell(config));

    // Stdin reads sit on the blocking pool; don't wait for them.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
    result
}

async fn shell(config: ShellConfig) -> anyhow::Result<()> {
    let backend = spawn_backend(config::BACKEND_BINARY, &config.backend)
        .await
        .context("failed to start backend")?;

    tracing::info!(
        backend = %backend.info.name,
        version = backend.info.version.as_deref().unwrap_or("unknown"),
        operations = backend.info.operations.len(),
        "backend ready"
    );

    let transport = DeadlineTransport::new(backend.transport(), config.call_timeout());
    let abandon = transport.abandon_token();
    let deadline_ms = transport.deadline().map(|d| d.as_millis() as u64);
    let app = Arc::new(App::new(Bridge::from_transport(transport)));
    tracing::info!(
        backend = %app.bridge().backend_name(),
        deadline_ms = ?deadline_ms,
        "shell ready"
    );

    println!("{}", app::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "stdin read failed");
                        break;
                    }
                };

                let action = match Action::parse(&line) {
                    Ok(Action::Quit) => break,
                    Ok(action) => action,
                    Err(hint) => {
                        if !hint.is_empty() {
                            println!("{hint}");
                        }
                        continue;
                    }
                };

                tracing::debug!(?action, "action");
                let app = Arc::clone(&app);
                in_flight.spawn(async move { app.handle(action).await });
            }
            Some(done) = in_flight.join_next(), if !in_flight.is_empty() => {
                print_result(done);
            }
        }
    }

    // Let in-flight calls finish briefly, then abandon the rest.
    let drained = tokio::time::timeout(QUIT_GRACE, async {
        while let Some(done) = in_flight.join_next().await {
            print_result(done);
        }
    })
    .await;

    if drained.is_err() {
        tracing::info!(pending = in_flight.len(), "abandoning in-flight calls");
        abandon.cancel();
        while let Some(done) = in_flight.join_next().await {
            print_result(done);
        }
    }

    backend.shutdown().await;
    tracing::info!("=== Postdesk stopped ===");
    Ok(())
}

fn print_result(done: Result<String, tokio::task::JoinError>) {
    match done {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => tracing::error!(error = %e, "action task failed"),
    }
}
