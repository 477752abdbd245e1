use crate::error::AppError;
use crate::handlers::auth::verify_session_token;
use crate::models::auth::Session;
use crate::AppState;
use axum::{
    extract::{Extension, Request},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Verifies the bearer token and attaches a [`Session`] to the request.
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;

    let claims = verify_session_token(token, &state.config.jwt_secret).map_err(|e| {
        tracing::warn!("JWT verification failed: {}", e);
        AppError::Unauthorized
    })?;

    let session = Session::try_from(&claims).map_err(|_| {
        tracing::warn!("Token subject is not a user id: {}", claims.sub);
        AppError::Unauthorized
    })?;

    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
