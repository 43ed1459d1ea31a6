//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::Request;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, MakeSpan, OnFailure,
    OnRequest, OnResponse, TraceLayer,
};
use tracing::{Level, Span};

use crate::api::routes;
use crate::config::ConverterConfig;
use crate::converter::{ArtifactStore, JobRegistry, JobRunner, TitleLookup, YtDlpTitleLookup};
use crate::error::Result;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 12556,
            enable_cors: true,
        }
    }
}

impl ApiServerConfig {
    /// Load API server config from environment variables, falling back to defaults.
    ///
    /// Supported env vars:
    /// - `API_BIND_ADDRESS` (e.g. "0.0.0.0")
    /// - `API_PORT` (e.g. "8080")
    pub fn from_env_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(bind_address) = std::env::var("API_BIND_ADDRESS")
            && !bind_address.trim().is_empty()
        {
            config.bind_address = bind_address;
        }

        if let Ok(port) = std::env::var("API_PORT")
            && let Ok(parsed) = port.parse::<u16>()
        {
            config.port = parsed;
        }

        config
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Live jobs
    pub registry: Arc<JobRegistry>,
    /// Background pipeline driver
    pub runner: JobRunner,
    /// Resolves titles before a job is created
    pub title_lookup: Arc<dyn TitleLookup>,
    /// Converter settings
    pub config: Arc<ConverterConfig>,
}

impl AppState {
    /// Build the state around an explicit title lookup.
    ///
    /// Running jobs are cancelled when `shutdown` is.
    pub fn new(
        config: ConverterConfig,
        title_lookup: Arc<dyn TitleLookup>,
        shutdown: CancellationToken,
    ) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(JobRegistry::new());
        let artifacts = Arc::new(ArtifactStore::new(
            config.artifact_dir.clone(),
            config.work_dir.clone(),
        ));
        let runner = JobRunner::new(registry.clone(), artifacts, config.clone(), shutdown);

        Self {
            start_time: Instant::now(),
            registry,
            runner,
            title_lookup,
            config,
        }
    }

    /// Build the state with the yt-dlp title lookup.
    pub fn from_config(config: ConverterConfig, shutdown: CancellationToken) -> Self {
        let title_lookup = Arc::new(YtDlpTitleLookup::new(
            config.ytdlp_path.clone(),
            config.title_timeout,
        ));
        Self::new(config, title_lookup, shutdown)
    }
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create with custom state. Cancelling `cancel_token` stops the server.
    pub fn with_state(
        config: ApiServerConfig,
        state: AppState,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            cancel_token,
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let mut router = routes::create_router(self.state.clone());

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router = router.layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &Request| {
                    if req.uri().path().starts_with("/health") {
                        Span::none()
                    } else {
                        DefaultMakeSpan::new().level(Level::INFO).make_span(req)
                    }
                })
                .on_request(|req: &Request, span: &Span| {
                    if !span.is_disabled() {
                        DefaultOnRequest::new().level(Level::INFO).on_request(req, span);
                    }
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                        if !span.is_disabled() {
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .on_response(res, latency, span);
                        }
                    },
                )
                .on_failure(
                    |class: ServerErrorsFailureClass, latency: Duration, span: &Span| {
                        if !span.is_disabled() {
                            DefaultOnFailure::new()
                                .level(Level::ERROR)
                                .on_failure(class, latency, span);
                        }
                    },
                ),
        );
        router
    }

    /// Start the server and serve until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| crate::error::Error::ApiError(format!("Invalid address: {}", e)))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("API server listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await
            .map_err(|e| crate::error::Error::ApiError(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
