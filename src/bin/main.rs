use trading_assistant_core::chat::ChatService;
use trading_assistant_core::models::ClientMeta;
use trading_assistant_core::sessions::HistoryOptions;
use tracing::info;
use uuid::Uuid;

/// One-shot demo run against whatever providers are configured. Without API
/// keys every lookup degrades gracefully to explanatory replies.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    dotenv::dotenv().ok();

    info!("Trading assistant demo starting");

    let service = ChatService::from_env()?;
    let user_id = Uuid::new_v4();
    let session_id = Uuid::new_v4();
    let meta = ClientMeta {
        platform: Some("cli".to_string()),
        user_agent: None,
    };

    let prompts = [
        "What is TCS stock price",
        "show me today's top gainers",
        "what is a p/e ratio?",
        "Compare TCS and INFY",
    ];

    for prompt in prompts {
        println!("\n>>> {}", prompt);
        match service
            .chat(prompt, user_id, session_id, "demo@example.com", &meta)
            .await
        {
            Ok(reply) => {
                println!("{}", reply.response);
                if !reply.suggestions.is_empty() {
                    println!("(try: {})", reply.suggestions.join(" | "));
                }
            }
            Err(e) => eprintln!("chat failed: {}", e),
        }
    }

    let history = service
        .history(
            user_id,
            &HistoryOptions {
                session_id: Some(session_id),
                ..Default::default()
            },
        )
        .await?;

    println!(
        "\n=== SESSION LOG: {} messages recorded ===",
        history
            .sessions
            .first()
            .map(|s| s.metadata.total_messages)
            .unwrap_or(0)
    );

    Ok(())
}
