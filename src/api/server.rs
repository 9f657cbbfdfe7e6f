//! Sheetmap API Server implementation
//!
//! HTTP REST API server using Axum. Provides endpoints for template
//! listing and reload plus single, batch and multi-source conversion.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::cli::Session;
use crate::config::AppConfig;
use crate::error::TransferResult;

/// Shared application state
pub struct AppState {
    pub version: String,
    pub session: Session,
}

impl AppState {
    pub fn new(session: Session) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            session,
        }
    }

    /// Load the template catalog named by `config`.
    pub fn from_config(config: &AppConfig) -> TransferResult<Self> {
        Ok(Self::new(Session::open(config)?))
    }
}

/// Build the router with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/version", get(handlers::version))
        // Templates
        .route("/api/v1/templates", get(handlers::list_templates))
        .route("/api/v1/templates/reload", post(handlers::reload_templates))
        // Conversion
        .route("/api/v1/convert", post(handlers::convert))
        .route("/api/v1/batch", post(handlers::batch))
        .route("/api/v1/merge", post(handlers::merge))
        // State and middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the API server
pub async fn run_api_server(config: AppConfig) -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "royalbit_sheetmap=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::from_config(&config)?);
    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Sheetmap API Server starting on http://{}", addr);
    info!("   Templates: {}", config.templates_dir.display());
    info!("   Endpoints: /api/v1/templates, /api/v1/convert, /api/v1/batch, /api/v1/merge");
    info!("   Health: /health, Version: /version");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Sheetmap API Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping server...");
}
