//! Test server harness for E2E testing
//!
//! Provides `TestTodoServer` for spawning the real todo router in tests,
//! wired to a mock identity provider and in-memory storage.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use todo_service::auth::{KeySetCache, TokenVerifier};
use todo_service::config::Config;
use todo_service::repositories::{InMemoryTodoRepository, TodoRepository};
use todo_service::routes::{self, AppState};
use tokio::task::JoinHandle;

/// Test harness for spawning the todo service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let provider = MockJwksProvider::start(&[&key]).await;
///     let server = TestTodoServer::spawn(&provider.url()).await?;
///
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestTodoServer {
    addr: SocketAddr,
    key_cache: Arc<KeySetCache>,
    todos: Arc<InMemoryTodoRepository>,
    _handle: JoinHandle<()>,
}

impl TestTodoServer {
    /// Spawn a server that trusts the identity provider at `auth_url`.
    ///
    /// Refresh throttling is disabled so tests do not have to wait it out.
    pub async fn spawn(auth_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(auth_url, HashMap::new()).await
    }

    /// Spawn with extra configuration variables (e.g. `AUTH_AUDIENCE`).
    ///
    /// # Returns
    /// * `Ok(TestTodoServer)` - Running server instance
    /// * `Err(anyhow::Error)` - If config, the initial key fetch or bind fails
    pub async fn spawn_with_vars(
        auth_url: &str,
        extra: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("AUTH_URL".to_string(), auth_url.to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("JWKS_FETCH_TIMEOUT_SECONDS".to_string(), "2".to_string()),
            (
                "JWKS_MIN_REFRESH_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ),
        ]);
        vars.extend(extra);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let key_cache = Arc::new(
            KeySetCache::initialize(config.jwks_url(), config.key_set_options())
                .await
                .map_err(|e| anyhow::anyhow!("Failed to load key set: {}", e))?,
        );
        let verifier = Arc::new(TokenVerifier::new(
            key_cache.clone(),
            config.verifier_options(),
        ));

        let todos = Arc::new(InMemoryTodoRepository::new());
        let repository: Arc<dyn TodoRepository> = todos.clone();

        let state = Arc::new(AppState {
            verifier,
            todos: repository,
        });

        // Recorder is built but not installed; the global one belongs to main.
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();
        let app = routes::build_app(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = axum::ServiceExt::<axum::extract::Request>::into_make_service(app);
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            key_cache,
            todos,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The server's key set cache.
    pub fn key_cache(&self) -> &Arc<KeySetCache> {
        &self.key_cache
    }

    /// The server's storage, for seeding or inspecting rows directly.
    pub fn todos(&self) -> &Arc<InMemoryTodoRepository> {
        &self.todos
    }
}

impl Drop for TestTodoServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
