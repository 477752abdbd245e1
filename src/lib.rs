pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod groq_client;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod relay;
pub mod store;

use std::sync::Arc;

use config::AppConfig;
use middleware::rate_limit::RateLimiter;
use relay::provider::CompletionProvider;
use relay::ChatRelay;
use sqlx::PgPool;
use store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub relay: ChatRelay,
    pub config: AppConfig,
    pub auth_limiter: RateLimiter,
    /// Present for the Postgres backend; used by the status probe.
    pub db_pool: Option<PgPool>,
}

impl AppState {
    pub fn new<S>(
        store: Arc<S>,
        provider: Arc<dyn CompletionProvider>,
        config: AppConfig,
        db_pool: Option<PgPool>,
    ) -> Self
    where
        S: Store + 'static,
    {
        let relay = ChatRelay::new(store.clone(), provider, config.relay.clone());
        Self {
            store,
            relay,
            config,
            auth_limiter: RateLimiter::for_auth(),
            db_pool,
        }
    }
}
