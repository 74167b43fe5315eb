use financial_intent_router::{api::start_server, config::AppConfig};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Financial Intent Router - API Server");
    info!("📍 Port: {}", config.port);

    let dispatcher = Arc::new(config.build_dispatcher().await?);

    info!("✅ Dispatcher initialized");
    info!("📡 Starting API server...");

    start_server(dispatcher, config.port).await?;

    Ok(())
}
