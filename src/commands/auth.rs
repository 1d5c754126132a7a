use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::GalleryError;
use crate::models::principal::{Principal, WhoAmI};
use crate::server::AppState;

/// Username and password from an `Authorization: Basic` header.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = GalleryError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let unauthorized = || GalleryError::Unauthorized {
            realm: state.config.realm.clone(),
        };
        let (username, password) = basic_credentials(&parts.headers).ok_or_else(unauthorized)?;

        let db = state.db.clone();
        let user = username.clone();
        let principal = tokio::task::spawn_blocking(move || db.authenticate(&user, &password)).await??;

        match principal {
            Some(principal) => {
                tracing::debug!(user = %username, "login");
                Ok(principal)
            }
            None => {
                tracing::warn!(user = %username, "failed login");
                Err(unauthorized())
            }
        }
    }
}

pub async fn whoami(principal: Principal) -> Json<WhoAmI> {
    Json(WhoAmI::from(&principal))
}
