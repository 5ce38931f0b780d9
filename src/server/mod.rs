// HTTP surface: routing, state and server lifecycle

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{DownloadResponse, UrlRequest};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::downloader::{Downloader, Fetcher, YtDlpFetcher};
use crate::sweeper::RetentionSweeper;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        path: String,
        source: std::io::Error,
    },

    #[error("cannot bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("tool detection failed: {0}")]
    Startup(String),
}

/// Shared, read-only state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub downloader: Arc<Downloader>,
}

impl AppState {
    pub fn new(config: Arc<ServerConfig>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            downloader: Arc::new(Downloader::new(fetcher)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let files = ServeDir::new(&state.config.output_dir);

    Router::new()
        .route("/", get(handlers::liveness))
        .route("/info", post(handlers::info))
        .route("/download", post(handlers::download))
        .nest_service("/downloads", files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the sweeper and serve until Ctrl-C
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .map_err(|source| ServerError::OutputDir {
            path: config.output_dir.display().to_string(),
            source,
        })?;

    let config = Arc::new(config);

    // Tool probing runs external commands
    let tool_config = Arc::clone(&config);
    let fetcher = tokio::task::spawn_blocking(move || YtDlpFetcher::from_config(&tool_config))
        .await
        .map_err(|e| ServerError::Startup(e.to_string()))?;

    let shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::from_config(&config).spawn(shutdown.clone());

    let addr = SocketAddr::new(config.bind_host, config.port);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    tracing::info!(
        %addr,
        output_dir = %config.output_dir.display(),
        max_size_bytes = config.max_size_bytes,
        "media downloader listening"
    );

    let app = router(AppState::new(Arc::clone(&config), Arc::new(fetcher)));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::error!(error = %e, "sweeper task panicked");
    }

    served.map_err(ServerError::from)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "cannot listen for Ctrl-C");
                // Without a signal handler, only the token can stop the server
                shutdown.cancelled().await;
            }
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("shutting down");
    shutdown.cancel();
}
