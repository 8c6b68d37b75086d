use financial_rag::{
    app::build_default_pipeline,
    conversation::{ChatSession, ConversationEvent},
    config::RagConfig,
    models::Turn,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DIVIDER: &str = "────────────────────────────────────────";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RagConfig::from_env()?;
    if config.gemini_api_key.is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
    }

    info!(data_path = %config.data_path.display(), "Financial RAG assistant starting");

    let generator = build_default_pipeline(&config).await?;
    let (session, events) = ChatSession::new(generator);
    let session = Arc::new(session);

    let renderer = tokio::spawn(render(events));

    println!("Financial Data Chatbot");
    println!("Ask a question about the dataset (empty line or Ctrl-D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        if let Err(e) = session.ask(question).await {
            error!(error = %e, "Question not accepted");
        }
    }

    // Dropping the session closes the event channel and ends the renderer.
    drop(session);
    renderer.await?;

    Ok(())
}

/// Redraws the latest exchange on every conversation event.
async fn render(mut events: UnboundedReceiver<ConversationEvent>) {
    while let Some(event) = events.recv().await {
        let Some(turn) = event.turns().last() else {
            continue;
        };

        match event {
            ConversationEvent::TurnSubmitted { .. } => {
                println!("{}", DIVIDER);
                println!("You");
                println!("{}", turn.question);
                println!();
                println!("Fetching answer...");
            }
            ConversationEvent::TurnResolved { .. } => print_answer(turn),
        }
    }
}

fn print_answer(turn: &Turn) {
    println!("Assistant");
    println!("{}", turn.answer.as_deref().unwrap_or_default());
    if let Some(label) = turn.confidence_label() {
        println!("Confidence: {}", label);
    }
}
