// src/extract.rs
//! Extractors that reject with `AppError` so malformed requests get the same
//! JSON error body as every other failure.

use crate::error::AppError;
use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request,
    },
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

/// JSON body. Rejections become `400 InvalidInput`.
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

/// Path parameters. Rejections become `400 InvalidInput`.
pub struct ValidPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(path_rejection(rejection)),
        }
    }
}

/// Query string. Rejections become `400 InvalidInput`.
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> AppError {
    tracing::debug!(reason = %rejection.body_text(), "rejected JSON body");
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => "Expected a JSON request body",
        JsonRejection::JsonSyntaxError(_) => "Malformed JSON body",
        JsonRejection::JsonDataError(_) => "Invalid request body",
        _ => "Could not read request body",
    };
    AppError::InvalidInput(message.to_string())
}

fn path_rejection(rejection: PathRejection) -> AppError {
    tracing::debug!(reason = %rejection.body_text(), "rejected path parameters");
    AppError::InvalidInput("Invalid path parameter".to_string())
}

fn query_rejection(rejection: QueryRejection) -> AppError {
    tracing::debug!(reason = %rejection.body_text(), "rejected query string");
    AppError::InvalidInput("Invalid query parameters".to_string())
}
