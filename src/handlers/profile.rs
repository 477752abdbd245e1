use crate::error::AppError;
use crate::extract::ValidJson;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Session;
use crate::models::profile::{
    ProfileDetail, ProfileResponse, ProfileUpdate, ProfileUser, UpdateProfileRequest,
};
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, Router},
};
use std::sync::Arc;

pub fn profile_routes() -> Router {
    Router::new()
        .route("/api/profile", get(get_profile).put(update_profile))
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn get_profile(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state
        .store
        .find_user(session.user_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let profile = state.store.find_profile(session.user_id).await?;

    Ok(Json(ProfileResponse {
        user: ProfileUser {
            name: user.name,
            email: user.email,
        },
        profile,
    }))
}

async fn update_profile(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    ValidJson(payload): ValidJson<UpdateProfileRequest>,
) -> Result<Json<ProfileDetail>, AppError> {
    if let Some(age) = payload.age {
        if !(0..=150).contains(&age) {
            return Err(AppError::InvalidInput("Age must be between 0 and 150".to_string()));
        }
    }

    if let Some(name) = payload.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        state.store.update_user_name(session.user_id, name).await?;
    }

    let profile = state
        .store
        .upsert_profile(session.user_id, ProfileUpdate::from(&payload))
        .await?;

    Ok(Json(profile))
}
