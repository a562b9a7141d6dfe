//! Serve command - run the capture proxy

use std::sync::Arc;

use anyhow::{Context, Result};
use liveweb_config::Config;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use crate::context::AppContext;
use crate::service;

/// Run the proxy until Ctrl-C or SIGTERM
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        platform = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        mode = config.server.mode.as_str(),
        directory = %config.storage.directory.display(),
        "liveweb starting"
    );

    let ctx = Arc::new(AppContext::from_config(&config)?);

    let result = serve(&config, Arc::clone(&ctx)).await;
    if let Err(e) = &result {
        error!(error = %e, "server error");
    }

    // Close on a blocking thread; flushing may touch the disk
    let closing = Arc::clone(&ctx);
    tokio::task::spawn_blocking(move || closing.close())
        .await
        .context("pool close task failed")?;

    info!("liveweb shutdown complete");
    result
}

async fn serve(config: &Config, ctx: Arc<AppContext>) -> Result<()> {
    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(
        addr = %addr,
        mode = config.server.mode.as_str(),
        max_jobs = config.server.blocking_threads,
        "proxy listening"
    );

    let app = service::router(ctx, config.server.blocking_threads);
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("proxy server failed")?;

    info!("shutdown signal received, stopped accepting requests");
    Ok(())
}

/// Wait for Ctrl-C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
