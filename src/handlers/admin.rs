use crate::error::AppError;
use crate::extract::{ValidPath, ValidQuery};
use crate::middleware::admin::admin_middleware;
use crate::middleware::auth::auth_middleware;
use crate::models::admin::{
    AdminConversation, AdminConversationsQuery, AdminStats, AdminUserSummary,
};
use crate::models::chat::MessageView;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{delete, get, Router},
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub fn admin_routes() -> Router {
    Router::new()
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:id", delete(delete_user))
        .route("/api/admin/conversations", get(list_conversations))
        .route(
            "/api/admin/conversations/:id",
            get(get_conversation).delete(delete_conversation),
        )
        .route("/api/admin/stats", get(stats))
        .layer(axum::middleware::from_fn(admin_middleware))
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn list_users(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<AdminUserSummary>>, AppError> {
    Ok(Json(state.store.list_users_with_counts().await?))
}

async fn delete_user(
    Extension(state): Extension<Arc<AppState>>,
    ValidPath(user_id): ValidPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_user(user_id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(user_id = %user_id, "User deleted by admin");
    Ok(Json(json!({
        "success": true,
        "message": "User deleted successfully"
    })))
}

async fn list_conversations(
    Extension(state): Extension<Arc<AppState>>,
    ValidQuery(query): ValidQuery<AdminConversationsQuery>,
) -> Result<Json<Vec<AdminConversation>>, AppError> {
    let mut conversations = state.store.list_all_conversations(query.user_id).await?;

    if query.include_messages {
        for conversation in conversations.iter_mut() {
            conversation.messages = Some(messages_of(&state, conversation.id).await?);
        }
    }

    Ok(Json(conversations))
}

/// Admins may inspect any conversation; there is no ownership check here.
async fn get_conversation(
    Extension(state): Extension<Arc<AppState>>,
    ValidPath(conversation_id): ValidPath<Uuid>,
) -> Result<Json<AdminConversation>, AppError> {
    let conversation = state
        .store
        .find_conversation(conversation_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let mut summary = state
        .store
        .list_all_conversations(Some(conversation.user_id))
        .await?
        .into_iter()
        .find(|c| c.id == conversation_id)
        .ok_or(AppError::NotFound)?;
    summary.messages = Some(messages_of(&state, conversation_id).await?);

    Ok(Json(summary))
}

async fn delete_conversation(
    Extension(state): Extension<Arc<AppState>>,
    ValidPath(conversation_id): ValidPath<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !state.store.delete_conversation(conversation_id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(conversation_id = %conversation_id, "Conversation deleted by admin");
    Ok(Json(json!({ "success": true })))
}

async fn stats(Extension(state): Extension<Arc<AppState>>) -> Result<Json<AdminStats>, AppError> {
    Ok(Json(state.store.stats().await?))
}

async fn messages_of(
    state: &AppState,
    conversation_id: Uuid,
) -> Result<Vec<MessageView>, AppError> {
    Ok(state
        .store
        .list_messages(conversation_id)
        .await?
        .into_iter()
        .map(MessageView::from)
        .collect())
}
