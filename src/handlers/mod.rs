// src/handlers/mod.rs
pub mod admin;
pub mod auth;
pub mod chat;
pub mod conversations;
pub mod mood;
pub mod profile;

use crate::middleware::logging::request_logging_middleware;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{get, Router},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Assembles every route with the shared layers. Used by `main` and by tests.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth::auth_routes())
        .merge(chat::chat_routes())
        .merge(conversations::conversation_routes())
        .merge(mood::mood_routes())
        .merge(profile::profile_routes())
        .merge(admin::admin_routes())
        .route("/api/status", get(api_status))
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let database = match &state.db_pool {
        Some(pool) if crate::db::ping(pool).await => "healthy",
        Some(_) => "unhealthy",
        None => "in_memory",
    };
    let provider = if state.config.groq.api_key.is_some() {
        "configured"
    } else {
        "not_configured"
    };

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": database,
            "completion_provider": provider,
        },
        "provider": state.relay.provider_name(),
        "model": state.config.relay.model,
    }))
}
