//! Reference backend: serves the shell's operations as JSON-RPC over stdio.

use std::sync::Arc;

use anyhow::Context;
use postdesk::backend::{self, BackendOptions, BackendState};
use postdesk::bridge::server::serve;

fn main() -> anyhow::Result<()> {
    postdesk::init_stderr_tracing();

    let options = BackendOptions::from_env().context("invalid backend options")?;
    tracing::info!(
        seeded_posts = options.seed.len(),
        cache_online = options.cache_online,
        "backend starting"
    );

    let state = BackendState::new(options).context("invalid seed posts")?;
    let registry = Arc::new(backend::registry(Arc::new(state)));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(serve(registry, tokio::io::stdin(), tokio::io::stdout()));

    // A blocked stdin read must not hold the process open after shutdown.
    runtime.shutdown_background();

    result.context("backend stdio loop failed")?;
    tracing::info!("backend stopped");
    Ok(())
}
