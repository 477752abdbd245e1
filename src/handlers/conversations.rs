use crate::error::AppError;
use crate::extract::{ValidJson, ValidQuery};
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Session;
use crate::models::chat::{
    parse_conversation_id, Conversation, ConversationDetail, ConversationQuery,
    ConversationSummary, DeleteConversationRequest,
};
use crate::store::find_owned_conversation;
use crate::AppState;
use axum::{
    extract::Extension,
    response::{IntoResponse, Json, Response},
    routing::{get, Router},
};
use serde_json::json;
use std::sync::Arc;

pub fn conversation_routes() -> Router {
    Router::new()
        .route(
            "/api/conversations",
            get(get_conversations).delete(delete_conversation),
        )
        .layer(axum::middleware::from_fn(auth_middleware))
}

/// Lists the caller's conversations, or returns one with its messages when
/// `?id=` is given.
async fn get_conversations(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    ValidQuery(query): ValidQuery<ConversationQuery>,
) -> Result<Response, AppError> {
    if let Some(raw_id) = query.id.as_deref().filter(|id| !id.is_empty()) {
        let conversation = owned_conversation(&state, &session, raw_id).await?;
        let messages = state.store.list_messages(conversation.id).await?;
        return Ok(Json(ConversationDetail::new(conversation, messages)).into_response());
    }

    let conversations: Vec<ConversationSummary> = state
        .store
        .list_conversations(session.user_id)
        .await?
        .into_iter()
        .map(ConversationSummary::from)
        .collect();

    Ok(Json(conversations).into_response())
}

async fn delete_conversation(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    ValidJson(payload): ValidJson<DeleteConversationRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let conversation = owned_conversation(&state, &session, &payload.id).await?;

    if !state.store.delete_conversation(conversation.id).await? {
        return Err(AppError::NotFound);
    }

    tracing::info!(conversation_id = %conversation.id, "Conversation deleted");
    Ok(Json(json!({ "success": true })))
}

async fn owned_conversation(
    state: &AppState,
    session: &Session,
    raw_id: &str,
) -> Result<Conversation, AppError> {
    let id = parse_conversation_id(raw_id).ok_or(AppError::NotFound)?;
    find_owned_conversation(state.store.as_ref(), id, session.user_id)
        .await?
        .ok_or(AppError::NotFound)
}
