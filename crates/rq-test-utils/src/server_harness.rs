//! Test server harness for E2E testing
//!
//! Provides `TestRqServer` for spawning real ReadQueue server instances in tests.

use metrics_exporter_prometheus::PrometheusBuilder;
use rq_service::config::Config;
use rq_service::repositories::{InMemoryStore, PgQueueStore, QueueStore};
use rq_service::routes::{self, AppState};
use sqlx::PgPool;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the ReadQueue server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_join_flow_e2e() -> Result<()> {
///     let server = TestRqServer::spawn().await?;
///     let client = reqwest::Client::new();
///
///     let response = client
///         .post(&format!("{}/api/queue/join", server.url()))
///         .json(&serde_json::json!({ "name": "Alice" }))
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestRqServer {
    addr: SocketAddr,
    config: Config,
    _handle: JoinHandle<()>,
}

impl TestRqServer {
    /// Spawn a server backed by a fresh in-memory store and default limits.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::spawn_with_vars(HashMap::new()).await
    }

    /// Spawn a server backed by a fresh in-memory store, with extra
    /// configuration variables (for example `MAX_PARTICIPANTS_PER_GROUP`).
    pub async fn spawn_with_vars(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        Self::spawn_with_store(Arc::new(InMemoryStore::new()), vars).await
    }

    /// Spawn a server backed by PostgreSQL (typically a `#[sqlx::test]` pool).
    ///
    /// The pool must already have the migrations applied.
    pub async fn spawn_with_pool(pool: PgPool) -> Result<Self, anyhow::Error> {
        Self::spawn_with_store(Arc::new(PgQueueStore::new(pool)), HashMap::new()).await
    }

    /// Spawn a server over an arbitrary store.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Start the HTTP server in the background
    /// - Not run the group reaper
    pub async fn spawn_with_store(
        store: Arc<dyn QueueStore>,
        mut vars: HashMap<String, String>,
    ) -> Result<Self, anyhow::Error> {
        vars.entry("BIND_ADDRESS".to_string())
            .or_insert_with(|| "127.0.0.1:0".to_string());

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = Arc::new(AppState::new(config.clone(), store));

        // A detached recorder: tests never install the global one
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for TestRqServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}
