use crate::AppState;
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Fixed-window limiter keyed by client IP.
#[derive(Clone)]
pub struct RateLimiter {
    // ip -> (requests in window, window start)
    clients: Arc<Mutex<HashMap<String, (u32, Instant)>>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            clients: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Ten requests a minute, used on the credential endpoints.
    pub fn for_auth() -> Self {
        Self::new(10, Duration::from_secs(60))
    }

    pub fn check(&self, client: &str) -> bool {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();

        let (count, window_start) = clients.entry(client.to_string()).or_insert((0, now));
        if now.duration_since(*window_start) > self.window {
            *count = 0;
            *window_start = now;
        }
        if *count >= self.max_requests {
            return false;
        }
        *count += 1;
        true
    }

    pub fn cleanup_expired(&self) {
        let mut clients = self.clients.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = Instant::now();
        clients.retain(|_, (_, window_start)| now.duration_since(*window_start) <= self.window);
    }
}

pub async fn auth_rate_limit_middleware(
    Extension(state): Extension<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Response {
    let client = connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if !state.auth_limiter.check(&client) {
        tracing::warn!("Auth rate limit exceeded for IP: {}", client);
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({
                "success": false,
                "message": "Too many attempts. Please try again later.",
                "retry_after": state.auth_limiter.window.as_secs()
            })),
        )
            .into_response();
    }

    if rand::random::<u8>() < 10 {
        state.auth_limiter.cleanup_expired();
    }

    next.run(request).await
}
