use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("access denied")]
    AccessDenied,
    #[error("not found")]
    NotFound,
    #[error("authentication required")]
    Unauthorized { realm: String },
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<image::ImageError> for GalleryError {
    fn from(err: image::ImageError) -> Self {
        GalleryError::Generation(err.to_string())
    }
}

impl From<zip::result::ZipError> for GalleryError {
    fn from(err: zip::result::ZipError) -> Self {
        GalleryError::Internal(format!("failed to write archive: {}", err))
    }
}

impl From<tokio::task::JoinError> for GalleryError {
    fn from(err: tokio::task::JoinError) -> Self {
        GalleryError::Internal(format!("worker task failed: {}", err))
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        match self {
            // No body: a denial must not reveal whether the folder exists.
            GalleryError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
            GalleryError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            GalleryError::Unauthorized { realm } => (
                StatusCode::UNAUTHORIZED,
                [(
                    header::WWW_AUTHENTICATE,
                    format!("Basic realm=\"{}\", charset=\"UTF-8\"", realm.replace('"', "'")),
                )],
                "authentication required",
            )
                .into_response(),
            other => {
                tracing::error!(error = %other, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Unexpected error").into_response()
            }
        }
    }
}
