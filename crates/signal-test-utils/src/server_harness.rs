//! Test server harness for E2E testing.
//!
//! Provides `TestSignalServer` for spawning real signal server instances on
//! a random local port.

use crate::fixtures::{TestUser, TEST_JWT_SECRET};
use signal_service::actors::ChannelRegistry;
use signal_service::config::Config;
use signal_service::routes::{self, AppState};
use signal_service::store::memory::InMemoryStore;
use signal_service::store::Stores;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness for spawning the signal server in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health() -> Result<(), anyhow::Error> {
///     let server = TestSignalServer::builder().spawn().await?;
///     let response = reqwest::get(format!("{}/health", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestSignalServer {
    addr: SocketAddr,
    state: Arc<AppState>,
    _handle: JoinHandle<()>,
}

/// Builder for [`TestSignalServer`].
#[derive(Default)]
pub struct TestSignalServerBuilder {
    users: Vec<TestUser>,
    vars: HashMap<String, String>,
    stores: Option<Stores>,
}

impl TestSignalServerBuilder {
    /// Add a user to the default in-memory directory.
    pub fn with_user(mut self, user: &TestUser) -> Self {
        self.users.push(user.clone());
        self
    }

    /// Override a `SIGNAL_*` configuration variable.
    pub fn with_var(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Use caller-provided collaborators instead of a fresh in-memory store.
    /// Users added with [`Self::with_user`] are ignored in that case.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Bind to 127.0.0.1:0 and serve in the background.
    pub async fn spawn(self) -> Result<TestSignalServer, anyhow::Error> {
        let mut vars = HashMap::from([
            ("SIGNAL_BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("SIGNAL_JWT_SECRET".to_string(), TEST_JWT_SECRET.to_string()),
        ]);
        vars.extend(self.vars);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let stores = match self.stores {
            Some(stores) => stores,
            None => {
                let store = InMemoryStore::new();
                for user in &self.users {
                    store.insert_user(user.identity());
                }
                Stores::from_backend(Arc::new(store))
            }
        };

        let state = Arc::new(AppState::new(config, stores, CancellationToken::new()));
        let app = routes::build_routes(Arc::clone(&state), None);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        state.health.set_ready();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestSignalServer {
            addr,
            state,
            _handle: handle,
        })
    }
}

impl TestSignalServer {
    pub fn builder() -> TestSignalServerBuilder {
        TestSignalServerBuilder::default()
    }

    /// Base HTTP URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Websocket URL for `path` (which must start with `/`).
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Chat websocket URL for `room` authenticated with `token`.
    pub fn chat_url(&self, room: &str, token: &str) -> String {
        self.ws_url(&format!("/ws/chat/{room}?token={token}"))
    }

    /// Call websocket URL authenticated with `token`.
    pub fn call_url(&self, token: &str) -> String {
        self.ws_url(&format!("/ws/call?token={token}"))
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.state.registry
    }

    /// Cancel every session, as server shutdown does.
    pub fn shutdown_sessions(&self) {
        self.state.shutdown.cancel();
    }
}

impl Drop for TestSignalServer {
    fn drop(&mut self) {
        self.state.shutdown.cancel();
        self._handle.abort();
    }
}
