use crate::error::AppError;
use crate::extract::ValidJson;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Session;
use crate::models::mood::{validate_mood, CreateMoodRequest, MoodEntry};
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, Router},
};
use std::sync::Arc;

pub fn mood_routes() -> Router {
    Router::new()
        .route("/api/mood", get(list_moods).post(create_mood))
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn create_mood(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    ValidJson(payload): ValidJson<CreateMoodRequest>,
) -> Result<(StatusCode, Json<MoodEntry>), AppError> {
    let mood = validate_mood(payload.mood.as_ref()).map_err(AppError::InvalidInput)?;
    let note = payload.note.unwrap_or_default();

    let entry = state
        .store
        .create_mood_entry(session.user_id, mood, &note)
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_moods(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Vec<MoodEntry>>, AppError> {
    Ok(Json(state.store.list_mood_entries(session.user_id).await?))
}
