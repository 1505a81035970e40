//! Sensor Ingest Server binary
//!
//! Start-up order matters: the reference model is built before the listener
//! is bound, so no session can ever observe a missing model.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sensor_ingest::{
    auth::TokenVerifier,
    classifier::{self, Classifier},
    config::{Config, StoreBackend},
    create_router, db,
    store::{ChannelRegistry, MemoryStore, PgStore, RetryingStore, SampleStore},
    AppState, SessionContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sensor_ingest=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").map(|f| f == "json").unwrap_or(false);
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Sensor ingest server starting...");

    // Build the reference model; failure here is fatal
    let model = classifier::build_from_file(&config.training_data_path, config.feature_profile)
        .with_context(|| {
            format!(
                "Failed to build reference model from {}",
                config.training_data_path.display()
            )
        })?;
    let classifier = Classifier::with_model(model);

    let (store, channels) = create_store(&config).await?;

    let session = SessionContext::new(
        TokenVerifier::from_config(&config),
        classifier,
        config.feature_profile,
        store,
        channels,
    )
    .with_smoothing_window(config.smoothing_window)
    .with_idle_timeout(config.session_idle_timeout);

    match config.session_idle_timeout {
        Some(t) => tracing::info!("Idle sessions are closed after {:?}", t),
        None => tracing::info!("No session idle timeout configured"),
    }

    let app = create_router(AppState::new(session));

    // Start server
    let addr = config.bind_addr();
    tracing::info!("🚀 Server listening on ws://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down cleanly");
    Ok(())
}

async fn create_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn SampleStore>, Arc<dyn ChannelRegistry>)> {
    match config.store_backend {
        StoreBackend::Postgres => {
            tracing::info!(
                "Database: {}",
                config.database_url.split('@').last().unwrap_or("***")
            );

            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;

            let store = PgStore::new(pool);
            let samples: Arc<dyn SampleStore> = Arc::new(RetryingStore::new(
                store.clone(),
                config.store_retry_attempts,
                config.store_retry_backoff,
            ));
            let channels: Arc<dyn ChannelRegistry> = Arc::new(store);
            Ok((samples, channels))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, samples are lost on shutdown");
            let store = Arc::new(MemoryStore::new());
            let samples: Arc<dyn SampleStore> = store.clone();
            let channels: Arc<dyn ChannelRegistry> = store;
            Ok((samples, channels))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("🛑 Shutdown signal received");
}
