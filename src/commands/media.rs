use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::GalleryError;
use crate::models::principal::Principal;
use crate::server::AppState;
use crate::services::layout::Resolved;
use crate::services::{access, archive_service, media, thumbnail_service};

/// Check the grant for `path`, then resolve it on the blocking pool.
async fn authorize(state: &AppState, principal: &Principal, path: &str) -> Result<Resolved, GalleryError> {
    if !access::permits(principal, state.layout.marker(), path) {
        tracing::warn!(user = %principal.identity, path = %path, "access denied");
        return Err(GalleryError::AccessDenied);
    }
    let layout = state.layout.clone();
    let path = path.to_string();
    tokio::task::spawn_blocking(move || layout.resolve(&path)).await?
}

fn last_segment(path: &str) -> &str {
    access::segments(path).last().copied().unwrap_or_default()
}

pub async fn serve_media(
    State(state): State<AppState>,
    principal: Principal,
    Path(path): Path<String>,
    request: Request,
) -> Result<Response, GalleryError> {
    let resolved = authorize(&state, &principal, &path).await?;
    if !resolved.path.is_file() {
        return Err(GalleryError::NotFound);
    }

    tracing::info!(user = %principal.identity, path = %path, "serving media");
    let response = ServeFile::new(&resolved.path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.map(Body::new))
}

pub async fn serve_thumbnail(
    State(state): State<AppState>,
    principal: Principal,
    Path(path): Path<String>,
) -> Result<Response, GalleryError> {
    let resolved = authorize(&state, &principal, &path).await?;
    let kind = media::classify(last_segment(&path)).ok_or(GalleryError::NotFound)?;

    let ffmpeg = state.config.ffmpeg.clone();
    let target = resolved.path;
    let result =
        tokio::task::spawn_blocking(move || thumbnail_service::generate_thumbnail_bytes(&target, kind, &ffmpeg))
            .await?;

    match result {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response()),
        Err(e) => {
            if let GalleryError::Generation(cause) = &e {
                tracing::error!(path = %path, cause = %cause, "thumbnail generation failed");
            }
            Err(e)
        }
    }
}

pub async fn download_section(
    State(state): State<AppState>,
    principal: Principal,
    Path(path): Path<String>,
) -> Result<Response, GalleryError> {
    let resolved = authorize(&state, &principal, &path).await?;

    let layout = state.layout.clone();
    let bytes = tokio::task::spawn_blocking(move || {
        archive_service::build_archive(&resolved.path, &resolved.root, &layout)
    })
    .await??;

    tracing::info!(user = %principal.identity, path = %path, "section downloaded");
    let filename = format!("{}.zip", last_segment(&path));
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, content_disposition(&filename)),
        ],
        bytes,
    )
        .into_response())
}

/// `attachment` header with an ASCII `filename` and a percent-encoded
/// UTF-8 `filename*`.
fn content_disposition(filename: &str) -> HeaderValue {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    let value = format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", fallback, encoded);
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
