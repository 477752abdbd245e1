use crate::config::AppConfig;
use crate::error::AppError;
use crate::extract::ValidJson;
use crate::middleware::{auth::auth_middleware, rate_limit::auth_rate_limit_middleware};
use crate::models::auth::*;
use crate::store::StoreError;
use crate::AppState;
use axum::{
    extract::Extension,
    http::StatusCode,
    response::Json,
    routing::{get, post, Router},
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{json, Value};
use std::sync::Arc;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn auth_routes() -> Router {
    let credential_routes = Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/admin/login", post(admin_login))
        .layer(axum::middleware::from_fn(auth_rate_limit_middleware));

    let session_routes = Router::new()
        .route("/api/auth/verify", get(verify_session))
        .layer(axum::middleware::from_fn(auth_middleware));

    credential_routes.merge(session_routes)
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    ValidJson(payload): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let name = payload.name.trim();
    let email = payload.email.trim().to_lowercase();

    if name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Name, email, and password are required".to_string(),
        ));
    }

    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::InvalidInput(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    let password_hash = hash(&payload.password, DEFAULT_COST).map_err(|e| {
        AppError::Internal(format!("Error hashing password: {}", e))
    })?;

    let user = state
        .store
        .create_user(NewUser {
            name: name.to_string(),
            email,
            password_hash,
            role: Role::User,
        })
        .await
        .map_err(|e| match e {
            StoreError::Duplicate(_) => {
                AppError::Conflict("User with this email already exists".to_string())
            }
            other => AppError::from(other),
        })?;

    tracing::info!(user_id = %user.id, "User registered");

    let token = generate_session_token(&user, &state.config)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            success: true,
            message: "User registered successfully".to_string(),
            user: user.into(),
            token,
        }),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = authenticate(&state, &payload).await?;
    let token = generate_session_token(&user, &state.config)?;

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: user.into(),
        token,
    }))
}

async fn admin_login(
    Extension(state): Extension<Arc<AppState>>,
    ValidJson(payload): ValidJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = authenticate(&state, &payload).await?;
    if user.role != Role::Admin {
        tracing::warn!(user_id = %user.id, "Admin login attempted by non-admin");
        return Err(AppError::InvalidCredentials);
    }

    let token = generate_session_token(&user, &state.config)?;
    Ok(Json(AuthResponse {
        success: true,
        message: "Admin login successful".to_string(),
        user: user.into(),
        token,
    }))
}

async fn verify_session(
    Extension(state): Extension<Arc<AppState>>,
    Extension(session): Extension<Session>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .store
        .find_user(session.user_id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(json!({
        "success": true,
        "user": UserResponse::from(user),
    })))
}

/// Unknown emails and wrong passwords are indistinguishable to the caller.
async fn authenticate(state: &AppState, payload: &LoginRequest) -> Result<User, AppError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::InvalidInput(
            "Email and password are required".to_string(),
        ));
    }

    let user = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    let valid = verify(&payload.password, &user.password_hash).map_err(|e| {
        AppError::Internal(format!("Error verifying password: {}", e))
    })?;
    if !valid {
        return Err(AppError::InvalidCredentials);
    }

    Ok(user)
}

pub fn generate_session_token(user: &User, config: &AppConfig) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
        exp: (now + Duration::hours(config.jwt_ttl_hours)).timestamp() as usize,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Error generating JWT token: {}", e)))
}

pub fn verify_session_token(
    token: &str,
    secret: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use uuid::Uuid;

    fn test_config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "STORE_BACKEND" => Some("memory".to_string()),
            "JWT_SECRET" => Some("unit-test-secret".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Achieng".to_string(),
            email: "achieng@example.com".to_string(),
            password_hash: String::new(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_round_trip_carries_identity() {
        let config = test_config();
        let admin = user(Role::Admin);

        let token = generate_session_token(&admin, &config).unwrap();
        let claims = verify_session_token(&token, &config.jwt_secret).unwrap();

        assert_eq!(claims.sub, admin.id.to_string());
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.email, "achieng@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let config = test_config();
        let token = generate_session_token(&user(Role::User), &config).unwrap();
        assert!(verify_session_token(&token, "some-other-secret").is_err());
    }
}
