use clap::Parser;
use proteus::adapters::api_handler::AppState;
use proteus::adapters::file_store::{FileStore, MemoryStore, StoreFormat};
use proteus::adapters::llm_generator::LlmValueGenerator;
use proteus::application::{openapi, ContractRegistry, SchemaResolver, ValueSynthesizer};
use proteus::cli::Cli;
use proteus::config::{schema, Settings, StoreBackend};
use proteus::domain::ContractStore;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let cli = Cli::parse();
    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!("Starting Proteus mock server on {}:{}", host, port);

    // Contract store
    let store: Arc<dyn ContractStore> = match settings.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Yaml => Arc::new(FileStore::new(&settings.store.path, StoreFormat::Yaml)),
        StoreBackend::Json => Arc::new(FileStore::new(&settings.store.path, StoreFormat::Json)),
    };

    // Engine
    let resolver = SchemaResolver::new(schema::catalog(&settings.schemas));
    let synthesizer = ValueSynthesizer::new(settings.synthesis.options());
    let mut registry = ContractRegistry::new(store, resolver, synthesizer, settings.registry_options());

    if let Some(llm) = &settings.llm {
        match LlmValueGenerator::from_config(llm) {
            Ok(generator) => {
                info!(model = %llm.model, "LLM value generation enabled");
                registry = registry.with_generator(Arc::new(generator));
            }
            Err(e) => warn!("LLM value generation disabled: {}", e),
        }
    }

    let registry = Arc::new(registry);
    let loaded = registry.load().await?;
    info!("Loaded {} contracts from {}", loaded, settings.store.path);

    if let Some(path) = &settings.openapi {
        let raw = tokio::fs::read(path).await?;
        let document = openapi::parse_document(&raw)?;
        let report = registry.import_openapi(&document).await?;
        info!(
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Imported OpenAPI document {}",
            path
        );
    }

    // Create application using the library function
    let state = AppState::new(registry.clone())?;
    state.metrics.contracts.set(registry.contract_count().await as i64);
    let app = proteus::create_app(state, &settings.admin.prefix);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {} (admin routes under {})", addr, settings.admin.prefix);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
