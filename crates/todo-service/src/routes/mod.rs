//! HTTP routes for the todo service.
//!
//! Defines the Axum router and application state.

use crate::auth::TokenVerifier;
use crate::handlers;
use crate::middleware::{http_metrics_middleware, require_auth, AuthState};
use crate::repositories::TodoRepository;
use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower::Layer;
use tower_http::{
    cors::CorsLayer, normalize_path::NormalizePath, normalize_path::NormalizePathLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};

/// Request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Token verifier; its key set cache also backs the readiness probe.
    pub verifier: Arc<TokenVerifier>,

    /// Todo storage.
    pub todos: Arc<dyn TodoRepository>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` - Liveness probe - public
/// - `/ready` - Readiness probe (key set + repository) - public
/// - `/metrics` - Prometheus metrics endpoint - public
/// - `/api/todos` - List / create todos - requires authentication
/// - `/api/todos/:id/toggle` - Toggle completion - requires authentication
/// - `/api/todos/:id` - Delete - requires authentication
/// - TraceLayer, 30 second timeout, permissive CORS, HTTP metrics
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        verifier: state.verifier.clone(),
    });

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .with_state(state.clone());

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route(
            "/api/todos",
            get(handlers::list_todos).post(handlers::create_todo),
        )
        .route("/api/todos/:id/toggle", patch(handlers::toggle_todo))
        .route("/api/todos/:id", delete(handlers::delete_todo))
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer (innermost)
    // 2. CorsLayer - answers preflight before auth runs
    // 3. TraceLayer
    // 4. http_metrics_middleware (outermost) - sees every response
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(http_metrics_middleware))
}

/// Router wrapped so `/api/todos/` and `/api/todos` route the same.
///
/// Path normalization has to run before routing, so it wraps the router
/// instead of being added with `Router::layer`.
pub fn build_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> NormalizePath<Router> {
    NormalizePathLayer::trim_trailing_slash().layer(build_routes(state, metrics_handle))
}
