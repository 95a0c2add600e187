//! Server bootstrap.
//!
//! [`GateServer`] assembles the middleware stack around application routes
//! and runs it until a shutdown signal or [`GateServer::stop`].
//!
//! Layer order, outermost first:
//!
//! ```text
//! http metrics → request id → real ip → request log → panic recovery
//!   → timeout → heartbeat → auth gate → claims projector → routes
//! ```
//!
//! `/metrics` (when a Prometheus handle is supplied) is mounted below the
//! heartbeat but outside the auth gate.

use crate::auth::{AuthGate, ClaimMapping};
use crate::config::Config;
use crate::handlers::metrics_handler;
use crate::middleware::heartbeat::HEARTBEAT_PATH;
use crate::middleware::{
    handle_panic, heartbeat, http_metrics_middleware, project_claims, real_ip, require_auth,
    RequestLogger,
};
use crate::routes::{RouteDoc, Routes};
use axum::{middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Per-request processing limit.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const METRICS_PATH: &str = "/metrics";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("server is already running")]
    AlreadyStarted,
}

/// HTTP server with the authentication stack in front of application routes.
pub struct GateServer {
    config: Config,
    router: Router,
    docs: Vec<RouteDoc>,
    shutdown: CancellationToken,
    started: AtomicBool,
}

impl GateServer {
    /// Build the middleware stack around `routes`.
    pub fn new(routes: Routes, config: Config, metrics_handle: Option<PrometheusHandle>) -> Self {
        let (mut router, mut docs) = routes.into_parts();

        if let Some(oidc) = &config.oidc {
            let mapping = Arc::new(ClaimMapping::new(config.claim_context_mapping.clone()));
            let gate = Arc::new(AuthGate::from_config(oidc));
            info!(
                target: "gk.server",
                audience = %oidc.audience,
                issuer = %oidc.issuer,
                jwks_url = %oidc.jwks_url,
                public_prefixes = ?oidc.public_url_prefixes,
                "OIDC authentication enabled"
            );
            router = router
                .layer(middleware::from_fn_with_state(mapping, project_claims))
                .layer(middleware::from_fn_with_state(gate, require_auth));
        } else {
            warn!(target: "gk.server", "OIDC authentication disabled");
        }

        if let Some(handle) = metrics_handle {
            // Merge into the metrics router so the gated fallback survives.
            router = Router::new()
                .route(METRICS_PATH, get(metrics_handler))
                .with_state(handle)
                .merge(router);
            docs.push(RouteDoc::new("GET", METRICS_PATH));
        }

        if !config.disable_heartbeat {
            router = router.layer(middleware::from_fn(heartbeat));
            docs.push(RouteDoc::new("GET", HEARTBEAT_PATH));
            docs.push(RouteDoc::new("HEAD", HEARTBEAT_PATH));
        }

        let logger = RequestLogger::new(&config.log_fields);
        router = router
            .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
            .layer(CatchPanicLayer::custom(handle_panic))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(logger.clone())
                    .on_request(logger.clone())
                    .on_response(logger)
                    .on_failure(()),
            );

        if !config.disable_real_ip {
            router = router.layer(middleware::from_fn(real_ip));
        }

        if !config.disable_request_id {
            router = router
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        }

        router = router.layer(middleware::from_fn(http_metrics_middleware));

        Self {
            config,
            router,
            docs,
            shutdown: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    /// The fully layered router (for in-process testing).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Registered routes plus built-in endpoints.
    pub fn route_docs(&self) -> &[RouteDoc] {
        &self.docs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Bind `BIND_ADDRESS` and serve until shutdown.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(self.config.bind_address.as_str())
            .await
            .map_err(|source| ServerError::Bind {
                addr: self.config.bind_address.clone(),
                source,
            })?;
        self.serve(listener).await
    }

    /// Serve on `listener` until SIGINT, SIGTERM or [`GateServer::stop`].
    ///
    /// In-flight requests get `SHUTDOWN_TIMEOUT_SECONDS` to complete after
    /// the shutdown signal.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        match listener.local_addr() {
            Ok(addr) => info!(target: "gk.server", %addr, "Gatekeeper listening"),
            Err(e) => warn!(target: "gk.server", error = %e, "Gatekeeper listening on unknown address"),
        }

        let token = self.shutdown.clone();
        let serve = axum::serve(
            listener,
            self.router
                .clone()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(token.clone()));

        let grace = Duration::from_secs(self.config.shutdown_timeout_seconds);
        let deadline = async {
            token.cancelled().await;
            tokio::time::sleep(grace).await;
        };

        let result = tokio::select! {
            result = serve.into_future() => result.map_err(ServerError::Serve),
            () = deadline => {
                warn!(target: "gk.server", grace_seconds = grace.as_secs(), "Graceful shutdown timed out, dropping open connections");
                Ok(())
            }
        };

        self.started.store(false, Ordering::SeqCst);
        info!(target: "gk.server", "Gatekeeper shutdown complete");
        result
    }

    /// Begin graceful shutdown. Does nothing if the server is not running.
    pub fn stop(&self) {
        if !self.is_started() {
            tracing::debug!(target: "gk.server", "Stop requested but server is not running");
            return;
        }
        info!(target: "gk.server", "Stop requested, starting graceful shutdown...");
        self.shutdown.cancel();
    }
}

/// Resolves on SIGINT, SIGTERM or cancellation of `token`, and cancels
/// `token` so the shutdown deadline starts.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!(target: "gk.server", "Received SIGINT, starting graceful shutdown..."),
            Err(e) => {
                error!(target: "gk.server", "Failed to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!(target: "gk.server", "Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!(target: "gk.server", "Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = token.cancelled() => {}
    }

    token.cancel();
}
