use std::net::SocketAddr;
use std::sync::Arc;

use faraja::config::{AppConfig, StoreBackend};
use faraja::groq_client::GroqClient;
use faraja::handlers::build_router;
use faraja::relay::provider::{CompletionProvider, UnconfiguredProvider};
use faraja::store::{MemoryStore, PgStore};
use faraja::{db, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    init_logging()?;

    let config = AppConfig::from_env()?;
    let provider = build_provider(&config)?;

    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config.database_url.clone().unwrap_or_default();
            let pool = db::create_pool(&database_url, config.db_max_connections).await?;
            tracing::info!("Database connection pool created successfully");
            let store = Arc::new(PgStore::new(pool.clone()));
            AppState::new(store, provider, config, Some(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            AppState::new(Arc::new(MemoryStore::new()), provider, config, None)
        }
    };

    let bind_addr = state.config.bind_addr.clone();
    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn build_provider(
    config: &AppConfig,
) -> Result<Arc<dyn CompletionProvider>, Box<dyn std::error::Error>> {
    match &config.groq.api_key {
        Some(api_key) => {
            let client = GroqClient::new(
                api_key.clone(),
                config.groq.base_url.clone(),
                config.groq.timeout,
            )?;
            tracing::info!(model = %config.relay.model, "Groq client initialized");
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!("GROQ_API_KEY not set; chat requests will fail with 502");
            Ok(Arc::new(UnconfiguredProvider))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let default_filter = if cfg!(debug_assertions) {
        "debug,faraja=trace,sqlx=info,reqwest=info,hyper=info,tower=info"
    } else {
        "info,sqlx=warn,reqwest=warn,hyper=warn,tower=warn"
    };

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?;

    let fmt_layer = if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_file(cfg!(debug_assertions))
            .with_line_number(cfg!(debug_assertions))
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        build = if cfg!(debug_assertions) { "development" } else { "production" },
        "Faraja starting up"
    );
    Ok(())
}
