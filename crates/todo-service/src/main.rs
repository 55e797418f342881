//! Todo service entry point.

use secrecy::ExposeSecret;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use todo_service::auth::{KeySetCache, TokenVerifier};
use todo_service::config::Config;
use todo_service::observability::metrics::init_metrics_recorder;
use todo_service::repositories::{InMemoryTodoRepository, PgTodoRepository, TodoRepository};
use todo_service::routes::{self, AppState};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!("Starting todo service");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        jwks_url = %config.jwks_url(),
        jwt_clock_skew_seconds = config.jwt_clock_skew_seconds,
        "Configuration loaded successfully"
    );

    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    // Without a first key set no request can be authenticated.
    let key_cache = KeySetCache::initialize(config.jwks_url(), config.key_set_options())
        .await
        .map_err(|e| {
            error!("Failed to load signing keys from identity provider: {}", e);
            e
        })?;
    let key_count = key_cache.snapshot().await.len();
    info!(key_count, "Signing keys loaded");

    let verifier = Arc::new(TokenVerifier::new(
        Arc::new(key_cache),
        config.verifier_options(),
    ));

    let todos: Arc<dyn TodoRepository> = match &config.database_url {
        Some(database_url) => {
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
            info!("Database connection established");
            Arc::new(PgTodoRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory todo storage");
            Arc::new(InMemoryTodoRepository::new())
        }
    };

    let state = Arc::new(AppState { verifier, todos });
    let app = routes::build_app(state, metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Todo service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        axum::ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .with_graceful_shutdown(shutdown_signal(config.drain_seconds))
    .await?;

    info!("Todo service shutdown complete");

    Ok(())
}

/// Plain text logs by default, JSON lines with `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "todo_service=debug,tower_http=debug".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT), then waits out the drain
/// period.
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
