//! HTTP boundary for vigil health checks
//!
//! Serves `GET /health[?no_deps]` and `GET /status` on top of a
//! [`HealthChecker`]. Each request is evaluated under a context derived from
//! the server's shutdown token, so stopping the server cancels in-flight
//! probes, and a dropped connection cancels the probes of its request.

#![allow(unused_crate_dependencies)]

pub mod health_endpoint;
pub mod simple_error;
pub mod status_page;


pub use health_endpoint::HealthEndpoint;
pub use simple_error::{DaemonError, Result};
pub use status_page::StatusPage;

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, Server, StatusCode};
use schema::DaemonConfig;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vigil_core::health::CheckContext;
use vigil_core::HealthChecker;

/// Handlers shared by every connection
#[derive(Debug, Clone)]
pub struct AppState {
    pub health: HealthEndpoint,
    pub status: StatusPage,
}

impl AppState {
    pub fn new(checker: Arc<HealthChecker>, config: &DaemonConfig) -> Self {
        Self {
            health: HealthEndpoint::new(checker.clone())
                .with_request_timeout(config.request_timeout()),
            status: StatusPage::from_config(checker, config),
        }
    }
}

/// Dispatch one request to its handler
pub async fn route(state: &AppState, req: Request<Body>, ctx: &CheckContext) -> Response<Body> {
    debug!(method = %req.method(), path = req.uri().path(), "request");
    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => state.health.handle(&req, ctx).await,
        (&Method::GET, "/status") => state.status.handle(ctx).await,
        (_, "/health") | (_, "/status") => {
            health_endpoint::text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".into())
        }
        _ => health_endpoint::text_response(StatusCode::NOT_FOUND, "Not found".into()),
    };

    result.unwrap_or_else(|e| {
        error!("Error building response: {}", e);
        let mut response = Response::new(Body::from(e.to_string()));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// The HTTP daemon
#[derive(Debug)]
pub struct Daemon {
    config: DaemonConfig,
    state: Arc<AppState>,
}

impl Daemon {
    /// Create a new daemon instance serving `checker`
    #[must_use]
    pub fn new(config: DaemonConfig, checker: HealthChecker) -> Self {
        let state = Arc::new(AppState::new(Arc::new(checker), &config));
        Self { config, state }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Bind the configured address and serve until `shutdown` is cancelled
    ///
    /// # Errors
    /// Returns an error if the listener cannot be bound or the server fails.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = std::net::TcpListener::bind(&addr)
            .map_err(|e| DaemonError::ServerError(format!("Failed to bind to {addr}: {e}")))?;
        self.start_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` is cancelled
    ///
    /// In-flight evaluations are cancelled and drained before this returns.
    pub async fn start_on(
        &self,
        listener: std::net::TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        let base = CheckContext::with_token(shutdown.child_token());
        let state = self.state.clone();

        let make_svc = make_service_fn(move |_conn| {
            let state = state.clone();
            let base = base.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let state = state.clone();
                    let base = base.clone();
                    async move { Ok::<_, Infallible>(route(&state, req, &base).await) }
                }))
            }
        });

        let server = Server::from_tcp(listener)?
            .serve(make_svc)
            .with_graceful_shutdown(async move { shutdown.cancelled().await });

        info!("Daemon started on {}", local_addr);
        server.await?;
        info!("Daemon on {} stopped", local_addr);
        Ok(())
    }
}
