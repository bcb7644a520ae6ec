use anyhow::Context;
use std::sync::Arc;

use coursequest_api::{
    config::{Config, StoreBackend},
    create_router,
    services::AppState,
    store::{LearningStore, MemoryStore, MongoStore},
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let tracer_provider = telemetry::init_tracing()?;

    tracing::info!("Starting CourseQuest API");

    let config = Config::load().context("Failed to load configuration")?;
    tracing::info!(
        "Configuration loaded for environment: {:?}, store backend: {:?}",
        std::env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string()),
        config.store_backend
    );

    let result = match config.store_backend {
        StoreBackend::Mongo => {
            let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
                .await
                .context("Failed to connect to MongoDB")?;
            let store = MongoStore::new(mongo_client, &config.mongo_database);
            store
                .ensure_indexes()
                .await
                .context("Failed to create MongoDB indexes")?;
            tracing::info!("MongoDB connected");
            serve(config, store).await
        }
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            match &config.seed_path {
                Some(path) => store.load_seed_file(path).await?,
                None => tracing::warn!(
                    "STORE_SEED_PATH not set, memory store starts with an empty catalog"
                ),
            }
            tracing::warn!("Using in-memory store, data is lost on restart");
            serve(config, store).await
        }
    };

    telemetry::shutdown_tracing(tracer_provider);
    result
}

async fn serve<S: LearningStore>(config: Config, store: S) -> anyhow::Result<()> {
    let redis_uri = config.redis_uri.clone();
    let bind_addr = config.bind_addr.clone();

    let mut app_state = AppState::new(config, store);
    if let Some(uri) = redis_uri {
        let redis_client = redis::Client::open(uri).context("Failed to create Redis client")?;
        app_state = app_state.with_redis(redis_client).await?;
    }

    let app = create_router(Arc::new(app_state));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
