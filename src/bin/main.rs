use financial_intent_router::{config::AppConfig, HandlerOutcome};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env()?;
    let dispatcher = config.build_dispatcher().await?;

    info!("Financial Intent Router ready - type 'quit' to exit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();

        if text.eq_ignore_ascii_case("quit") {
            break;
        }
        if text.is_empty() {
            continue;
        }

        let output = match dispatcher.process_for(Uuid::nil(), text).await {
            HandlerOutcome::Result(value) => serde_json::to_string_pretty(&value)?,
            HandlerOutcome::Error(reason) => format!("Error: {}", reason),
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
    }

    info!("Goodbye");
    Ok(())
}
