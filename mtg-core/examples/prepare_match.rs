//! Prepare a Commander match from the deck directories and ask rules questions.
//!
//! Reads `decks/player/*.txt` and `decks/opponent/*.txt` (or `$MTG_DECKS_DIR`),
//! prints the starting state, then answers each command-line argument as a
//! question about the cards in play.
//!
//! Run with: `cargo run -p mtg-core --example prepare_match -- "What does my commander do?"`

use mtg_core::{MatchConfig, MatchSession, Progress};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mtg_core=info")),
        )
        .init();

    let _ = dotenvy::dotenv();

    let config = MatchConfig::from_env()?.with_progress(Arc::new(|p: &Progress<'_>| {
        tracing::info!("[{}/{}] {}", p.completed, p.total, p.name);
    }));
    tracing::info!(?config, "preparing match");

    let session = MatchSession::prepare(config).await?;

    for warning in session
        .player_deck()
        .warnings()
        .iter()
        .chain(session.opponent_deck().warnings())
    {
        tracing::warn!("skipped deck line {warning}");
    }
    for name in session.knowledge().missing() {
        tracing::warn!("no oracle text for {name}");
    }

    println!("{}", serde_json::to_string_pretty(session.game())?);

    let mut conversation = session.conversation();
    for question in std::env::args().skip(1) {
        println!("\n> {question}");
        match conversation.ask(&question).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}
