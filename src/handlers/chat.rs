use crate::error::AppError;
use crate::extract::ValidJson;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::Session;
use crate::models::chat::{parse_conversation_id, ChatTurnRequest};
use crate::relay::{TurnMode, TurnOutcome};
use crate::AppState;
use axum::{
    body::Body,
    extract::Extension,
    http::{header, HeaderValue},
    response::Response,
    routing::{post, Router},
};
use std::sync::Arc;
use uuid::Uuid;

pub const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

pub fn chat_routes() -> Router {
    Router::new()
        .route("/api/chat", post(open_chat))
        .route("/api/chat/guarded", post(guarded_chat))
        .layer(axum::middleware::from_fn(auth_middleware))
}

async fn open_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    ValidJson(payload): ValidJson<ChatTurnRequest>,
) -> Result<Response, AppError> {
    relay_turn(&state, &session, payload, TurnMode::Open).await
}

async fn guarded_chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
    ValidJson(payload): ValidJson<ChatTurnRequest>,
) -> Result<Response, AppError> {
    relay_turn(&state, &session, payload, TurnMode::TopicGuarded).await
}

async fn relay_turn(
    state: &AppState,
    session: &Session,
    payload: ChatTurnRequest,
    mode: TurnMode,
) -> Result<Response, AppError> {
    let conversation_id = match payload.conversation_id.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(parse_conversation_id(raw).ok_or(AppError::NotFound)?),
    };

    let outcome = state
        .relay
        .submit_turn(session, &payload.message, conversation_id, mode)
        .await?;

    match outcome {
        TurnOutcome::Refused(text) => Ok(streaming_response(Body::from(text), None)),
        TurnOutcome::Streaming(turn) => {
            // The pump task finishes and persists on its own; the handle is not awaited here.
            let body = Body::from_stream(turn.tokens);
            Ok(streaming_response(body, Some(turn.conversation_id)))
        }
    }
}

fn streaming_response(body: Body, conversation_id: Option<Uuid>) -> Response {
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    if let Some(id) = conversation_id {
        if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
            headers.insert(CONVERSATION_ID_HEADER, value);
        }
    }
    response
}
