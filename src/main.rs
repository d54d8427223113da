use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::Registry;
use tokio::net::TcpListener;

use clients_service::config::Settings;
use clients_service::domain::client::PgClientRepository;
use clients_service::health::HealthCheck;
use clients_service::metrics::{register_application_info, PgMetrics};
use clients_service::postgres::{ConnectionPool, PostgresIndicator, RegisterMetricsOptions};
use clients_service::server::{create_app, AppState};
use clients_service::shutdown::Shutdown;
use clients_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new().context("failed to load configuration")?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.logger, &settings.app.name)?;
    tracing::info!(env = %settings.app.env, "Configuration loaded");

    let shutdown = Shutdown::new();
    let registry = Registry::new();
    let subsystem = settings.app.name.clone();

    register_application_info(&subsystem, &registry)?;
    let pg_metrics = Arc::new(PgMetrics::register(&subsystem, &registry)?);

    // Connect to PostgreSQL
    let pool_config = settings.postgres.pool_config();
    tracing::info!(url = %pool_config.masked_url(), "Connecting to PostgreSQL");
    let mut pool = ConnectionPool::connect(&pool_config, pg_metrics.clone())
        .await
        .context("failed to connect to PostgreSQL")?;
    pool.register_metrics(RegisterMetricsOptions {
        query: Some(pg_metrics.clone()),
        transaction: Some(pg_metrics.clone()),
    });
    let pool = Arc::new(pool);

    let supervisor = pool.spawn_supervisor(pool_config.health_check_period, shutdown.token());

    // Probes
    let readiness = HealthCheck::new(settings.health.timeout())
        .with_policy(settings.health.timeout_policy);
    let mut liveness = HealthCheck::new(settings.health.timeout())
        .with_policy(settings.health.timeout_policy);
    liveness.register_indicator(Arc::new(PostgresIndicator::new(
        settings.health.postgres_component.clone(),
        pool.clone(),
        shutdown.token(),
    )));

    // Create application state
    let clients = Arc::new(PgClientRepository::new(pool.clone()));
    let state = AppState::new(
        settings.clone(),
        clients,
        readiness,
        liveness,
        registry,
    )?;
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    let signals = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.listen_for_signals().await })
    };

    let server = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown({
                    let shutdown = shutdown.clone();
                    async move { shutdown.wait().await }
                })
                .await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "HTTP server failed");
            }
            // The rest of the process stops with the server
            shutdown.signal("server stopped");
            result
        })
    };

    shutdown.wait().await;

    // Drain in-flight requests
    let drain = settings.server.shutdown_timeout();
    match tokio::time::timeout(drain, server).await {
        Ok(Ok(Ok(()))) => tracing::info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server exited with error"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task panicked"),
        Err(_) => tracing::warn!(
            timeout_secs = drain.as_secs(),
            "Graceful shutdown timed out, dropping remaining connections"
        ),
    }

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = tokio::join!(signals, supervisor);

    pool.close().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}
