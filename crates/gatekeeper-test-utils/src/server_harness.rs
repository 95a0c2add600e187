//! Test server harness for E2E testing
//!
//! Provides `TestGateServer` for spawning real gatekeeper instances in tests,
//! each with its own wiremock JWKS endpoint.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use crate::token_builders::{TEST_AUDIENCE, TEST_ISSUER};
use gatekeeper::config::{Config, JWKS_WELL_KNOWN_PATH};
use gatekeeper::handlers::{get_me, hello_public, hello_root};
use gatekeeper::{GateServer, Routes};
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// The demo routes: `/hello`, `/public` and `/me`.
pub fn default_routes() -> Routes {
    Routes::new()
        .get("/hello", hello_root)
        .get("/public", hello_public)
        .get("/me", get_me)
}

/// Builder for [`TestGateServer`].
pub struct TestGateServerBuilder {
    routes: Option<Routes>,
    vars: HashMap<String, String>,
    jwks_keys: Option<Vec<Value>>,
}

impl TestGateServerBuilder {
    /// Serve these routes instead of [`default_routes`].
    pub fn routes(mut self, routes: Routes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Set an environment variable for the server configuration.
    pub fn env(mut self, name: &str, value: &str) -> Self {
        self.vars.insert(name.to_string(), value.to_string());
        self
    }

    /// Serve these JWKs (default: the primary test key).
    pub fn jwks(mut self, keys: Vec<Value>) -> Self {
        self.jwks_keys = Some(keys);
        self
    }

    /// Mount nothing on the JWKS mock; the test mounts its own responses.
    pub fn without_jwks(mut self) -> Self {
        self.jwks_keys = None;
        self
    }

    /// Start the JWKS mock and the server on a random local port.
    pub async fn spawn(self) -> Result<TestGateServer, anyhow::Error> {
        let mock_server = MockServer::start().await;
        if let Some(keys) = self.jwks_keys {
            Mock::given(method("GET"))
                .and(path(JWKS_WELL_KNOWN_PATH))
                .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(&keys)))
                .mount(&mock_server)
                .await;
        }

        let mut vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
            ("OIDC_AUDIENCE".to_string(), TEST_AUDIENCE.to_string()),
            ("OIDC_ISSUER".to_string(), TEST_ISSUER.to_string()),
            (
                "OIDC_JWKS_URL".to_string(),
                format!("{}{}", mock_server.uri(), JWKS_WELL_KNOWN_PATH),
            ),
            ("SHUTDOWN_TIMEOUT_SECONDS".to_string(), "1".to_string()),
        ]);
        vars.extend(self.vars);

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let routes = self.routes.unwrap_or_else(default_routes);
        let server = Arc::new(GateServer::new(routes, config, None));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let running = Arc::clone(&server);
        let handle = tokio::spawn(async move {
            if let Err(e) = running.serve(listener).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(TestGateServer {
            addr,
            mock_server,
            server,
            handle,
        })
    }
}

/// Test harness for spawning a gatekeeper in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_hello() -> Result<()> {
///     let server = TestGateServer::spawn().await?;
///     let token = TestTokenBuilder::new().build();
///
///     let response = reqwest::Client::new()
///         .get(format!("{}/hello", server.url()))
///         .bearer_auth(token)
///         .send()
///         .await?;
///
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGateServer {
    addr: SocketAddr,
    mock_server: MockServer,
    server: Arc<GateServer>,
    handle: JoinHandle<()>,
}

impl TestGateServer {
    /// Spawn with the default routes and the primary key in the JWKS.
    pub async fn spawn() -> Result<Self, anyhow::Error> {
        Self::builder().spawn().await
    }

    pub fn builder() -> TestGateServerBuilder {
        TestGateServerBuilder {
            routes: None,
            vars: HashMap::new(),
            jwks_keys: Some(vec![TestSigningKey::primary().jwk()]),
        }
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The JWKS mock, for mounting or resetting responses.
    pub fn mock_server(&self) -> &MockServer {
        &self.mock_server
    }

    pub fn server(&self) -> &GateServer {
        &self.server
    }

    /// Requests the JWKS mock has received.
    pub async fn jwks_fetches(&self) -> usize {
        self.mock_server
            .received_requests()
            .await
            .map(|requests| {
                requests
                    .iter()
                    .filter(|r| r.url.path() == JWKS_WELL_KNOWN_PATH)
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Drop for TestGateServer {
    fn drop(&mut self) {
        self.server.stop();
        self.handle.abort();
    }
}
