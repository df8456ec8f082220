//! Process configuration for match preparation.
//!
//! Credentials and overrides are read from the environment once, at
//! startup. Everything else is set through [`MatchConfig`]'s builder.

use crate::advisor::AdvisorConfig;
use crate::deck::DeckSources;
use crate::game::{CommanderRule, SetupConfig};
use crate::index::IndexConfig;
use crate::oracle::{AggregatorConfig, ProgressObserver};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const VOYAGE_API_KEY: &str = "VOYAGE_API_KEY";
pub const SEED_VAR: &str = "MTG_SEED";
pub const DECKS_DIR_VAR: &str = "MTG_DECKS_DIR";

/// Errors from reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    MissingVar(&'static str),

    #[error("{var} has an invalid value {value:?}")]
    InvalidVar { var: &'static str, value: String },
}

/// API keys for the hosted services.
#[derive(Clone)]
pub struct Credentials {
    pub anthropic_api_key: String,
    pub voyage_api_key: String,
}

impl Credentials {
    /// Read both keys from the environment. Empty values count as missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            anthropic_api_key: required(ANTHROPIC_API_KEY)?,
            voyage_api_key: required(VOYAGE_API_KEY)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("anthropic_api_key", &"<redacted>")
            .field("voyage_api_key", &"<redacted>")
            .finish()
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingVar(var)),
    }
}

fn optional(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Configuration for preparing a match.
#[derive(Clone)]
pub struct MatchConfig {
    /// Where the player and opponent decks are read from.
    pub decks: DeckSources,

    /// Oracle lookup concurrency and retries.
    pub aggregator: AggregatorConfig,

    /// Chunking and embedding batch size.
    pub index: IndexConfig,

    /// Retrieval depth and prompt budget.
    pub advisor: AdvisorConfig,

    /// Opening hand, life total, commander rule and seed.
    pub setup: SetupConfig,

    /// Claude model override.
    pub model: Option<String>,

    /// Embedding model override.
    pub embedding_model: Option<String>,

    /// Maximum tokens per answer.
    pub max_tokens: usize,

    /// Called as each card's oracle text is resolved.
    pub progress: Option<ProgressObserver>,
}

impl MatchConfig {
    pub fn new() -> Self {
        Self {
            decks: DeckSources::default(),
            aggregator: AggregatorConfig::default(),
            index: IndexConfig::default(),
            advisor: AdvisorConfig::default(),
            setup: SetupConfig::default(),
            model: None,
            embedding_model: None,
            max_tokens: 1024,
            progress: None,
        }
    }

    /// Defaults with `MTG_DECKS_DIR` and `MTG_SEED` applied when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::new();

        if let Some(dir) = optional(DECKS_DIR_VAR) {
            config = config.with_decks_dir(dir);
        }

        if let Some(value) = optional(SEED_VAR) {
            let seed = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidVar {
                    var: SEED_VAR,
                    value: value.clone(),
                })?;
            config = config.with_seed(seed);
        }

        Ok(config)
    }

    /// Read decks from `<root>/player` and `<root>/opponent`.
    pub fn with_decks_dir(mut self, root: impl Into<PathBuf>) -> Self {
        self.decks = DeckSources::under(root.into());
        self
    }

    pub fn with_deck_sources(mut self, decks: DeckSources) -> Self {
        self.decks = decks;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.index.chunk_size = chunk_size;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.advisor.top_k = top_k;
        self
    }

    pub fn with_condensed_questions(mut self, enabled: bool) -> Self {
        self.advisor.condense_question = enabled;
        self
    }

    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        self.aggregator.concurrency = concurrency;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.aggregator.max_retries = retries;
        self
    }

    pub fn with_opening_hand_size(mut self, size: usize) -> Self {
        self.setup.opening_hand_size = size;
        self
    }

    pub fn with_commander_rule(mut self, rule: CommanderRule) -> Self {
        self.setup.commander_rule = rule;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.setup.seed = Some(seed);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_progress(mut self, observer: ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchConfig")
            .field("decks", &self.decks)
            .field("aggregator", &self.aggregator)
            .field("index", &self.index)
            .field("advisor", &self.advisor)
            .field("setup", &self.setup)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("max_tokens", &self.max_tokens)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_defaults() {
        let config = MatchConfig::new();

        assert_eq!(config.decks.player_dir, Path::new("decks/player"));
        assert_eq!(config.decks.opponent_dir, Path::new("decks/opponent"));
        assert_eq!(config.index.chunk_size, 500);
        assert_eq!(config.advisor.top_k, 4);
        assert_eq!(config.aggregator.concurrency, 4);
        assert_eq!(config.setup.opening_hand_size, 7);
        assert_eq!(config.setup.seed, None);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_builder_chain() {
        let config = MatchConfig::new()
            .with_decks_dir("fixtures")
            .with_chunk_size(250)
            .with_top_k(6)
            .with_lookup_concurrency(2)
            .with_max_retries(0)
            .with_seed(17)
            .with_commander_rule(CommanderRule::SetAside)
            .with_model("claude-sonnet-4-20250514")
            .with_max_tokens(512);

        assert_eq!(config.decks.player_dir, Path::new("fixtures/player"));
        assert_eq!(config.index.chunk_size, 250);
        assert_eq!(config.advisor.top_k, 6);
        assert_eq!(config.aggregator.concurrency, 2);
        assert_eq!(config.aggregator.max_retries, 0);
        assert_eq!(config.setup.seed, Some(17));
        assert_eq!(config.setup.commander_rule, CommanderRule::SetAside);
        assert_eq!(config.model.as_deref(), Some("claude-sonnet-4-20250514"));
        assert_eq!(config.max_tokens, 512);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials {
            anthropic_api_key: "sk-ant-secret".into(),
            voyage_api_key: "pa-secret".into(),
        };

        let debug = format!("{credentials:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_missing_var_message() {
        let err = ConfigError::MissingVar(VOYAGE_API_KEY);
        assert_eq!(err.to_string(), "VOYAGE_API_KEY is not set");
    }
}
