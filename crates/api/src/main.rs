use std::sync::Arc;

use anyhow::Context;

use minerep_api::app::{build_app, services::build_services};
use minerep_infra::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    minerep_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(build_services(&config).await?);

    let app = build_app(services.clone(), config.server.jwt_secret.clone());

    let listener = tokio::net::TcpListener::bind(config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // The router and its clones are gone once serve returns.
    match Arc::try_unwrap(services) {
        Ok(services) => {
            let stats = services.shutdown().await;
            tracing::info!(?stats, "report dispatcher drained");
        }
        Err(_) => tracing::warn!(
            "report services still shared at shutdown; in-flight jobs recover on next start"
        ),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
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

    tracing::info!("shutdown signal received");
}
