use crate::error::AppError;
use crate::models::auth::Session;
use axum::{extract::Request, middleware::Next, response::Response};

/// Runs after [`super::auth::auth_middleware`]. Anything short of an admin
/// session gets the same 401 as a missing token.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, AppError> {
    match request.extensions().get::<Session>() {
        Some(session) if session.is_admin() => Ok(next.run(request).await),
        Some(session) => {
            tracing::warn!(
                user_id = %session.user_id,
                "Non-admin session rejected from admin route"
            );
            Err(AppError::Unauthorized)
        }
        None => Err(AppError::Unauthorized),
    }
}
