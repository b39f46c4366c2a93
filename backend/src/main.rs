//! Transfer Manager - Backend Server

use std::{net::SocketAddr, sync::Arc, time::Duration};

use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_manager::{
    create_app,
    external::LightspeedClient,
    services::{CsrfTokens, Diagnostics, OutboxRelay, SyncFlag},
    AppState, Config,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let default_filter = if config.debug {
        "transfer_manager=debug,tower_http=debug,sqlx=warn"
    } else {
        "transfer_manager=info,tower_http=info,sqlx=warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Transfer Manager");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let gateway = LightspeedClient::new(&config.lightspeed)?;
    let csrf = CsrfTokens::new(&config.security.csrf_secret)?;

    // Create application state
    let state = AppState {
        db: db_pool.clone(),
        config: Arc::new(config.clone()),
        gateway: Arc::new(gateway),
        sync: SyncFlag::new(&config.sync.flag_file),
        diagnostics: Diagnostics::new(),
        csrf,
    };

    // Audit outbox relay
    let shutdown = CancellationToken::new();
    let relay = OutboxRelay::new(db_pool, config.outbox.clone());
    let relay_handle = tokio::spawn(relay.run(shutdown.clone()));

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = relay_handle.await {
        tracing::warn!(error = %e, "Outbox relay task ended abnormally");
    }

    Ok(())
}
