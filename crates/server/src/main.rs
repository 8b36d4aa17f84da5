mod bootstrap;
mod health;
mod routes;

use std::time::Duration;

use anyhow::Result;
use axum::Router;
use salesagent_core::config::{AppConfig, LoadOptions};
use salesagent_mcp::{A2aServer, McpServer};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::Application;
use crate::routes::IngressState;

fn init_logging(config: &AppConfig) {
    use salesagent_core::config::LogFormat::*;

    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config first so logging is configured before anything else runs.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router = app_router(&app);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reconciler = app.config.reconciliation.enabled.then(|| {
        app.runtime
            .reconciler()
            .spawn(Duration::from_secs(app.config.reconciliation.interval_secs), shutdown_rx)
    });

    info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        reconciliation = reconciler.is_some(),
        "salesagent-server listening"
    );
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
    info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "salesagent-server stopping"
    );

    let _ = shutdown_tx.send(true);
    if let Some(handle) = reconciler {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, handle).await.is_err() {
            warn!(
                event_name = "system.server.reconciler_abandoned",
                correlation_id = "shutdown",
                grace_secs = grace.as_secs(),
                "reconciler did not stop within the grace period"
            );
        }
    }
    app.db_pool.close().await;

    Ok(())
}

fn app_router(app: &Application) -> Router {
    let tenant_header = app.config.tenancy.tenant_header.to_ascii_lowercase();
    let mcp = McpServer::new(app.runtime.clone(), tenant_header.clone());
    let ingress = IngressState { a2a: A2aServer::new(app.runtime.clone()), tenant_header };
    routes::router(ingress, mcp).merge(health::router(app.db_pool.clone()))
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(event_name = "system.server.signal_error", error = %error, "ctrl-c handler failed");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                warn!(event_name = "system.server.signal_error", error = %error, "SIGTERM handler failed");
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
