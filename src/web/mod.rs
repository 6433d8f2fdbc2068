//! Web layer
//!
//! HTTP interface of the previewer: the preview route, health and readiness
//! probes, request logging and response compression. Handlers stay thin and
//! delegate to [`PreviewService`].

use anyhow::Result;
use axum::{Router, middleware::from_fn, routing::get};
use std::net::SocketAddr;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tracing::info;

use crate::config::WebConfig;
use crate::services::PreviewService;

pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod readiness;
pub mod responses;

pub use readiness::Readiness;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub previews: PreviewService,
    pub readiness: Readiness,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(previews: PreviewService, readiness: Readiness) -> Self {
        Self {
            previews,
            readiness,
            started_at: chrono::Utc::now(),
        }
    }
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
    readiness: Readiness,
}

impl WebServer {
    pub fn new(config: &WebConfig, previews: PreviewService) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
        let readiness = Readiness::new();
        let app = Self::create_router(AppState::new(previews, readiness.clone()));
        Ok(Self {
            app,
            addr,
            readiness,
        })
    }

    /// Create the router with all routes and middleware
    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/ready", get(handlers::health::readiness_check))
            .route("/health", get(handlers::health::health_check))
            .route(
                "/{mode}/{width}/{height}/{*url}",
                get(handlers::previews::get_preview),
            )
            .layer(
                ServiceBuilder::new()
                    .layer(from_fn(middleware::request_logging_middleware))
                    .layer(CompressionLayer::new()),
            )
            .with_state(state)
    }

    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    /// Serve until cancelled.
    ///
    /// `ready_signal` receives the bound address once listening, or the bind
    /// error. Without a cancellation token the server stops on SIGINT/SIGTERM.
    pub async fn serve_with_cancellation(
        self,
        ready_signal: oneshot::Sender<Result<SocketAddr>>,
        cancellation_token: Option<CancellationToken>,
    ) -> Result<()> {
        let listener = match tokio::net::TcpListener::bind(&self.addr).await {
            Ok(listener) => listener,
            Err(bind_error) => {
                let bind_err_msg = format!("Failed to bind to {}: {}", self.addr, bind_error);
                let _ = ready_signal.send(Err(anyhow::anyhow!("{}", bind_err_msg)));
                return Err(anyhow::anyhow!("{}", bind_err_msg));
            }
        };
        let local_addr = listener.local_addr()?;

        self.readiness.mark_ready();
        info!(address = %local_addr, "Web server listening");
        let _ = ready_signal.send(Ok(local_addr));

        let readiness = self.readiness.clone();
        let shutdown_signal = async move {
            match cancellation_token {
                Some(token) => {
                    token.cancelled().await;
                    info!("Web server received cancellation signal, shutting down gracefully");
                }
                None => wait_for_shutdown_signal().await,
            }
            // Stop advertising readiness before connections drain
            readiness.mark_not_ready();
        };

        axum::serve(
            listener,
            self.app
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await?;

        info!("Web server stopped");
        Ok(())
    }
}

/// Resolve on SIGINT or SIGTERM (Ctrl+C only on non-unix targets)
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
                    _ = sigint.recv() => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
                }
            }
            _ => {
                tracing::warn!("Failed to install unix signal handlers, falling back to Ctrl+C");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutdown only via cancellation");
            std::future::pending::<()>().await;
        }
    }
}
