//! Commander match preparation with a card-rules knowledge base.
//!
//! This crate provides:
//! - Deck list parsing with sideboard handling
//! - Oracle text lookup for every distinct card, deduplicated across decks
//! - Chunking and embedding of that text into a retrieval index
//! - A conversational rules advisor backed by Claude
//! - Starting game state for a two-player Commander match
//!
//! # Quick Start
//!
//! ```ignore
//! use mtg_core::{ConversationHistory, MatchConfig, MatchSession};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MatchConfig::new()
//!         .with_decks_dir("decks")
//!         .with_seed(42);
//!
//!     let session = MatchSession::prepare(config).await?;
//!     println!("Opening hand: {:?}", session.game().player.hand);
//!
//!     let answer = session
//!         .ask("What does my commander do?", &ConversationHistory::new())
//!         .await?;
//!     println!("{}", answer.answer);
//!     Ok(())
//! }
//! ```

pub mod advisor;
pub mod config;
pub mod deck;
pub mod game;
pub mod index;
pub mod oracle;
pub mod session;
pub mod testing;

// Primary public API
pub use advisor::{
    AdvisorConfig, AdvisorError, Answer, ClaudeModel, Conversation, ConversationHistory,
    LanguageModel, ModelError, RulesAdvisor, Turn,
};
pub use config::{ConfigError, Credentials, MatchConfig};
pub use deck::{CardMultiset, DeckEntry, DeckError, DeckList, DeckSources, ParseWarning};
pub use game::{CommanderRule, GamePhase, GameState, PlayerState, Seat, SetupConfig};
pub use index::{build_index, Chunk, EmbedError, Embedder, IndexConfig, IndexError, RetrievalIndex};
pub use oracle::{
    AggregateError, AggregatorConfig, CardKnowledge, CardKnowledgeAggregator, LookupError,
    OracleLookup, Progress, ProgressObserver,
};
pub use session::{MatchSession, SessionError};
pub use testing::{HashingEmbedder, MockOracle, ScriptedModel};
