//! PunchSync daemon entry point.
//!
//! Loads configuration, wires the application context and runs the
//! background services until the process receives SIGINT or SIGTERM.

mod context;

use anyhow::Context as AnyhowContext;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::context::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment files are optional; a missing .env is not an error.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = punchsync_infra::config::load().context("failed to load configuration")?;

    let mut ctx = AppContext::initialize(&config)?;
    if let Err(e) = ctx.start_all().await {
        error!(error = %e, "startup failed; shutting down partially started services");
        ctx.stop_all().await;
        return Err(e);
    }

    info!("punchsyncd running; press Ctrl+C to stop");
    wait_for_shutdown().await;

    info!("shutdown signal received");
    ctx.stop_all().await;
    Ok(())
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler; relying on Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for Ctrl+C");
                }
                return;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for Ctrl+C");
                }
            }
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
        }
    }
}
