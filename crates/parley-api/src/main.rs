use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parley_api::{
    build_router,
    config::{Config, StoreBackend},
    state::AppState,
};
use parley_graph::{ChatOrchestrator, Graph, GraphConfig};
use parley_llm::{ChatClient, ClientFactory};
use parley_persist::{
    MemoryCache, MemoryPersistenceClient, MongoPersistenceClient, PersistClientBuilder, PersistenceClient,
};
use parley_tools::ToolRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting Parley API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    // Durable store
    let store: Arc<dyn PersistenceClient> = match config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            let store = MemoryPersistenceClient::new();
            for tenant in &config.seed.tenants {
                store.insert_tenant(tenant.into()).await?;
            }
            for user in &config.seed.users {
                store.insert_user(user.into()).await?;
            }
            Arc::new(store)
        }
        StoreBackend::Mongodb => {
            tracing::info!(database = %config.store.database, "Connecting to MongoDB");
            let store = MongoPersistenceClient::connect(&config.mongodb_uri, &config.store.database).await?;
            store.ensure_schema().await?;
            tracing::info!("MongoDB connected");
            Arc::new(store)
        }
    };

    // Fast cache
    let cache = MemoryCache::new();
    let _sweeper = cache.spawn_sweeper(Duration::from_secs(config.cache.sweep_interval_secs.max(1)));

    let persist = PersistClientBuilder::new()
        .store(store)
        .cache(Arc::new(cache))
        .credentials_ttl(config.cache.credentials_ttl())
        .threads_ttl(config.cache.threads_ttl())
        .usage_ttl(config.cache.usage_ttl())
        .build()
        .await?;

    // Model provider chains
    tracing::info!("Initializing LLM provider chains");
    let standard: Arc<dyn ChatClient> = Arc::new(ClientFactory::create_fallback_chain(
        &config.llm.standard_chain()?,
    )?);
    let reasoning: Arc<dyn ChatClient> = Arc::new(ClientFactory::create_fallback_chain(
        &config.llm.reasoning_chain()?,
    )?);

    let graph = Graph::new(
        standard,
        reasoning,
        GraphConfig::new()
            .with_max_steps(config.llm.max_steps)
            .with_timeout(Duration::from_secs(config.llm.execution_timeout_secs)),
    );

    let registry = ToolRegistry::new(persist.credentials().clone(), &config.tools);
    let orchestrator =
        ChatOrchestrator::new(persist, registry, Arc::new(graph)).with_event_buffer(config.llm.event_buffer);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState::new(config, orchestrator));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);
    tracing::info!("API docs: http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry.with(tracing_subscriber::fmt::layer().json()).init();
        }
        _ => {
            registry.with(tracing_subscriber::fmt::layer().pretty()).init();
        }
    }
}
