use axum::extract::State;
use axum::Json;

use crate::error::GalleryError;
use crate::models::fs_types::GalleryData;
use crate::models::principal::Principal;
use crate::server::AppState;
use crate::services::fs_service;

pub async fn gallery_data(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<GalleryData>, GalleryError> {
    let layout = state.layout.clone();
    let structure =
        tokio::task::spawn_blocking(move || fs_service::gallery_structure(&layout, &principal)).await?;
    Ok(Json(GalleryData { structure }))
}
