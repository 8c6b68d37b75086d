use financial_rag::{api::start_server, app::build_default_pipeline, config::RagConfig};
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

    // Load environment variables
    dotenv::dotenv().ok();

    let config = RagConfig::from_env()?;
    if config.gemini_api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 See .env.example for setup instructions");
    }

    info!("🚀 Financial RAG Assistant - API Server");
    info!("📍 Port: {}", config.port);

    let generator = build_default_pipeline(&config).await?;

    info!("✅ Fact index loaded");
    info!("📡 Starting API server...");

    start_server(generator, config.port).await?;

    Ok(())
}
