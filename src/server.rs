use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

use crate::commands::{auth, gallery, media, status};
use crate::config::Config;
use crate::services::db::Database;
use crate::services::layout::StorageLayout;
use crate::services::video_service;

const STATUS_PREFIX: &str = "/_status";

/// Shared, read-only request state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub layout: Arc<StorageLayout>,
    pub db: Database,
}

impl AppState {
    pub fn new(config: Config, layout: StorageLayout, db: Database) -> Self {
        Self {
            config: Arc::new(config),
            layout: Arc::new(layout),
            db,
        }
    }

    /// Create the storage roots and open the database named in `config`.
    pub fn from_config(config: Config) -> Result<Self, ServerError> {
        let layout = StorageLayout::from_config(&config).map_err(ServerError::Storage)?;
        let db = Database::new(&config.database).map_err(|e| ServerError::Database(e.to_string()))?;
        Ok(Self::new(config, layout, db))
    }
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}

pub fn router(state: AppState) -> Router {
    let log_level = state.config.tracing_level().unwrap_or(tracing::Level::INFO);
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    Router::new()
        .nest(STATUS_PREFIX, status::router())
        .route("/api/gallery-data", get(gallery::gallery_data))
        .route("/api/whoami", get(auth::whoami))
        .route("/media/*path", get(media::serve_media))
        .route("/thumbnail/*path", get(media::serve_thumbnail))
        .route("/download/section/*path", get(media::download_section))
        .fallback(not_found_handler)
        .with_state(state)
        .layer(trace_layer)
}

pub async fn run(state: AppState) -> Result<(), ServerError> {
    let listen_addr = state.config.listen_addr;

    if !video_service::ffmpeg_available(&state.config.ffmpeg) {
        tracing::warn!(
            ffmpeg = %state.config.ffmpeg.display(),
            "ffmpeg not found, video thumbnails will fail"
        );
    }
    tracing::info!(
        public = %state.layout.public_root().display(),
        private = %state.layout.private_root().display(),
        "serving media roots"
    );

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(addr = ?listen_addr, "starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
    #[error("failed to prepare storage roots: {0}")]
    Storage(#[source] std::io::Error),
    #[error("failed to open database: {0}")]
    Database(String),
}
