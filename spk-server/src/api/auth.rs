//! Bearer-token authentication
//!
//! Each user carries an API token issued at registration. Protected routes
//! resolve `Authorization: Bearer <token>` to that user and hand it to the
//! handler as an [`AuthUser`] extension.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use spk_common::models::User;
use tracing::debug;

use crate::{ApiError, AppState};

/// The authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// Authentication middleware
///
/// Returns 401 when the header is missing, malformed or names no user.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(ApiError::Unauthorized)?;

    let Some(user) = state.store.user_by_token(token).await else {
        debug!(path = %request.uri().path(), "Rejected unknown API token");
        return Err(ApiError::Unauthorized);
    };

    request.extensions_mut().insert(AuthUser(user));
    Ok(next.run(request).await)
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
