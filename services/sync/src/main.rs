mod connector;
mod gitlab;
mod http;
mod metrics;
mod okta;
mod pagination;
mod reconcile;
mod rest;
mod schedule;
mod service;
mod stage;
#[cfg(test)]
mod testing;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use strata_config::{init_tracing, AppConfig, SyncConfig};
use strata_db::graph::pg_repository::PgEntityGraphRepository;

use crate::http::{build_router, AppState, SERVICE_NAME};
use crate::metrics::SyncMetrics;
use crate::service::ConnectorService;

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    let sync_config = SyncConfig::from_env().expect("failed to load connector config");
    tracing::info!(service = SERVICE_NAME, "starting");

    let pool = strata_db::create_pool(&config.database_url)
        .await
        .expect("failed to connect to database");
    let graph = Arc::new(PgEntityGraphRepository::new(pool));
    let service =
        ConnectorService::initialize(&sync_config, graph, Arc::new(SyncMetrics::new()));

    if config.run_once {
        let report = service.run_cycle().await;
        tracing::info!(
            total_operations = report.total_operations(),
            total_errors = report.total_errors(),
            skipped = report.skipped.len(),
            "single sync cycle finished"
        );
        return;
    }

    let cancel = CancellationToken::new();
    let timers = service.schedule(cancel.clone());

    let app = build_router(AppState {
        service: service.clone(),
    });
    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .expect("server error");

    service.mark_stopped();
    let grace = Duration::from_secs(config.shutdown_grace_secs);
    match tokio::time::timeout(grace, futures::future::join_all(timers)).await {
        Ok(_) => tracing::info!("all connector timers stopped"),
        Err(_) => tracing::warn!(
            grace_secs = config.shutdown_grace_secs,
            "in-flight passes did not finish within the grace period"
        ),
    }
    tracing::info!("sync service finished");
}

/// Resolves on Ctrl+C or SIGTERM and stops the connector timers.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }

    cancel.cancel();
}
