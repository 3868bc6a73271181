use std::sync::Arc;
use trading_assistant_core::api::start_server;
use trading_assistant_core::chat::ChatService;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    if std::env::var("GEMINI_API_KEY").is_err() {
        eprintln!("⚠️  GEMINI_API_KEY not set; replies fall back to data-only text");
    }

    info!("🚀 Trading Assistant Core - API Server");
    info!("📍 Port: {}", api_port);

    let service = Arc::new(ChatService::from_env()?);

    info!("✅ Chat service initialized");
    info!("📡 Starting API server...");

    start_server(service, api_port).await?;

    Ok(())
}
