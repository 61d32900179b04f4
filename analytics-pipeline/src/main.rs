use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod permission;
pub mod repository;
pub mod service;

use config::Config;
use permission::{HttpPermissionClient, InMemoryPermissionClient, PermissionClient};
use repository::{InMemoryPipelineRepository, PgPipelineRepository, PipelineRepository};
use service::Registry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.default_log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Analytics Pipeline Registry...");

    let repository = connect_repository(&config).await?;
    let permissions = connect_permissions(&config)?;

    let registry = Arc::new(
        Registry::new(repository, permissions, config.permissions_admin_token.clone())
            .await
            .context("Failed to register the pipeline permission topic")?,
    );

    let shutdown = CancellationToken::new();

    if config.reconcile_on_startup {
        match registry.reconcile_permissions(&shutdown).await {
            Ok(report) => tracing::info!("Startup reconciliation: {:?}", report),
            Err(e) => tracing::warn!("Startup reconciliation failed: {}", e),
        }
    }

    let reconciler = config.reconcile_interval().map(|interval| {
        tokio::spawn(reconcile_periodically(
            registry.clone(),
            interval,
            shutdown.clone(),
        ))
    });

    // Build router with all API endpoints
    let app = api::create_router(registry, &config.url_prefix);

    let addr = config.bind_address();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    if let Some(handle) = reconciler {
        join_reconciler(handle).await;
    }

    tracing::info!("Analytics Pipeline Registry stopped");
    Ok(())
}

async fn connect_repository(config: &Config) -> anyhow::Result<Arc<dyn PipelineRepository>> {
    if config.uses_in_memory_store() {
        tracing::warn!("Using in-memory pipeline store, data is lost on restart");
        return Ok(Arc::new(InMemoryPipelineRepository::new()));
    }

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(PgPipelineRepository::new(pool)))
}

fn connect_permissions(config: &Config) -> anyhow::Result<Arc<dyn PermissionClient>> {
    if config.uses_mock_permissions() {
        tracing::warn!("Using in-memory permission store");
        return Ok(Arc::new(InMemoryPermissionClient::new(
            config.permissions_admin_token.clone(),
        )));
    }

    let client = HttpPermissionClient::new(&config.permissions_url, config.permissions_timeout())
        .context("Failed to create permission service client")?;
    tracing::info!("Permission service: {}", client.base_url());

    Ok(Arc::new(client))
}

async fn reconcile_periodically(
    registry: Arc<Registry>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    // the first tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = registry.reconcile_permissions(&cancel).await {
                    tracing::warn!("Periodic reconciliation failed: {}", e);
                }
            }
        }
    }

    tracing::debug!("Reconciliation task stopped");
}

/// Waits for the reconciliation task, reporting a panic or abort
async fn join_reconciler(handle: tokio::task::JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!("Reconciliation task failed: {}", e);
            false
        }
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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

    tracing::info!("Shutdown signal received");
    cancel.cancel();
}
