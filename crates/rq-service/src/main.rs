//! ReadQueue Service
//!
//! Entry point for the shared reading station queue.

use rq_service::config::Config;
use rq_service::observability::metrics::init_metrics_recorder;
use rq_service::repositories::{InMemoryStore, PgQueueStore, QueueStore};
use rq_service::routes::{self, AppState};
use rq_service::tasks::start_group_reaper;
use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rq_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ReadQueue service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        persistent = config.database_url.is_some(),
        max_participants_per_group = config.max_participants_per_group,
        reaper_interval_seconds = config.reaper_interval_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let store = build_store(&config).await?;

    let bind_address = config.bind_address.clone();
    let reaper_interval = Duration::from_secs(config.reaper_interval_seconds);
    let drain_seconds = config.drain_seconds;

    // Reaper shares the store with the handlers and stops on the same token
    let cancel_token = CancellationToken::new();
    let reaper_handle = tokio::spawn(start_group_reaper(
        store.clone(),
        reaper_interval,
        cancel_token.child_token(),
    ));

    let state = Arc::new(AppState::new(config, store));
    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("ReadQueue service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let serve_result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_seconds))
    .await;

    cancel_token.cancel();
    if let Err(e) = reaper_handle.await {
        error!("Group reaper task failed: {}", e);
    }

    serve_result?;

    info!("ReadQueue service shutdown complete");

    Ok(())
}

/// Pick the backing store: PostgreSQL when a database URL is configured,
/// process memory otherwise.
async fn build_store(config: &Config) -> Result<Arc<dyn QueueStore>, Box<dyn std::error::Error>> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set, using in-memory store (state is lost on restart)");
        return Ok(Arc::new(InMemoryStore::new()));
    };

    info!("Connecting to database...");
    let db_url_with_timeout = add_query_timeout(database_url.expose_secret(), 5);
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&db_url_with_timeout)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    let store = PgQueueStore::new(pool);
    store.migrate().await.map_err(|e| {
        error!("Failed to run migrations: {}", e);
        e
    })?;

    info!("Database connection established");

    Ok(Arc::new(store))
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_secs: u64) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    if drain_secs > 0 {
        warn!("Draining connections for {} seconds...", drain_secs);
        tokio::time::sleep(Duration::from_secs(drain_secs)).await;
        info!("Drain period complete");
    } else {
        info!("Skipping drain period (RQ_DRAIN_SECONDS=0)");
    }
}

/// Adds statement_timeout to the database URL.
fn add_query_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}
