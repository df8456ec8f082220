//! Card knowledge aggregation.
//!
//! Resolves every distinct card name across a set of decks to its oracle
//! (rules) text. Each name is looked up once per run, however many copies
//! or decks it appears in. Lookups run concurrently up to a cap and are
//! committed in first-appearance order, so the resulting corpus is stable.

use crate::deck::DeckList;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single oracle lookup.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("card not found: {0}")]
    NotFound(String),

    #[error("card database unavailable: {reason}")]
    Transport { reason: String, retryable: bool },
}

impl LookupError {
    pub fn transport(reason: impl Into<String>) -> Self {
        LookupError::Transport {
            reason: reason.into(),
            retryable: true,
        }
    }
}

/// Errors that abort an aggregation run.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("oracle lookup failed for {name:?}: {source}")]
    Unavailable {
        name: String,
        #[source]
        source: LookupError,
    },
}

/// Source of oracle text for a card name.
#[async_trait]
pub trait OracleLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<String, LookupError>;
}

#[async_trait]
impl<T: OracleLookup + ?Sized> OracleLookup for Arc<T> {
    async fn lookup(&self, name: &str) -> Result<String, LookupError> {
        (**self).lookup(name).await
    }
}

#[async_trait]
impl OracleLookup for scryfall::Scryfall {
    async fn lookup(&self, name: &str) -> Result<String, LookupError> {
        match self.card_named(name).await {
            Ok(card) => Ok(card.rules_text()),
            Err(scryfall::Error::NotFound(name)) => Err(LookupError::NotFound(name)),
            Err(e) => Err(LookupError::Transport {
                retryable: e.is_transient(),
                reason: e.to_string(),
            }),
        }
    }
}

/// A progress notification, sent after each card is committed.
#[derive(Debug, Clone, Copy)]
pub struct Progress<'a> {
    pub completed: usize,
    pub total: usize,
    pub name: &'a str,
}

/// Callback receiving [`Progress`] notifications.
pub type ProgressObserver = Arc<dyn Fn(&Progress<'_>) + Send + Sync>;

/// Tuning for an aggregation run.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum lookups in flight at once.
    pub concurrency: usize,

    /// Extra attempts after a retryable transport failure.
    pub max_retries: u32,

    /// Delay before the first retry; grows linearly with each attempt.
    pub retry_backoff: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Oracle text for every distinct card in a run.
#[derive(Debug, Clone, Default)]
pub struct CardKnowledge {
    entries: Vec<(String, String)>,
    positions: HashMap<String, usize>,
    missing: Vec<String>,
}

impl CardKnowledge {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            missing: Vec::new(),
        }
    }

    fn insert(&mut self, name: String, text: String) {
        self.positions.insert(name.clone(), self.entries.len());
        self.entries.push((name, text));
    }

    fn insert_missing(&mut self, name: String) {
        self.missing.push(name.clone());
        self.insert(name, String::new());
    }

    /// Oracle text for a card; empty if the card was not found.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.positions
            .get(name)
            .map(|&i| self.entries[i].1.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Card names in first-appearance order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// `(name, oracle text)` pairs in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, text)| (name.as_str(), text.as_str()))
    }

    /// Names the card database did not recognise.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    /// One `"<name>:<oracle text>\n"` line per card, in first-appearance order.
    pub fn corpus(&self) -> String {
        self.entries
            .iter()
            .map(|(name, text)| format!("{name}:{text}\n"))
            .collect()
    }
}

/// Distinct card names across all decks, in order of first appearance.
pub fn unique_card_names(decks: &[DeckList]) -> Vec<String> {
    let mut seen = HashSet::new();
    decks
        .iter()
        .flat_map(|deck| deck.unique_names())
        .filter(|name| seen.insert(*name))
        .map(str::to_string)
        .collect()
}

/// Resolves deck cards to oracle text through an [`OracleLookup`].
pub struct CardKnowledgeAggregator<L> {
    lookup: L,
    config: AggregatorConfig,
    observer: Option<ProgressObserver>,
}

impl<L: OracleLookup> CardKnowledgeAggregator<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            config: AggregatorConfig::default(),
            observer: None,
        }
    }

    pub fn with_config(mut self, config: AggregatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_progress(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Look up every distinct card in `decks`.
    ///
    /// Unknown cards get an empty entry and the run continues. A transport
    /// failure that survives the retries aborts the run; nothing partial is
    /// returned.
    pub async fn aggregate(&self, decks: &[DeckList]) -> Result<CardKnowledge, AggregateError> {
        let names = unique_card_names(decks);
        let total = names.len();
        tracing::info!(
            unique = total,
            concurrency = self.config.concurrency,
            "resolving oracle text"
        );

        let mut results = stream::iter(names.into_iter().map(|name| async move {
            let result = self.resolve(&name).await;
            (name, result)
        }))
        .buffered(self.config.concurrency.max(1));

        let mut knowledge = CardKnowledge::with_capacity(total);
        while let Some((name, result)) = results.next().await {
            match result {
                Ok(text) => {
                    tracing::debug!(card = %name, "resolved oracle text");
                    knowledge.insert(name, text);
                }
                Err(LookupError::NotFound(_)) => {
                    tracing::warn!(card = %name, "card not found, recording empty oracle text");
                    knowledge.insert_missing(name);
                }
                Err(source) => {
                    tracing::error!(card = %name, error = %source, "oracle lookup unavailable");
                    return Err(AggregateError::Unavailable { name, source });
                }
            }

            if let Some(ref observer) = self.observer {
                if let Some((name, _)) = knowledge.entries.last() {
                    observer(&Progress {
                        completed: knowledge.len(),
                        total,
                        name,
                    });
                }
            }
        }

        tracing::info!(
            resolved = knowledge.len(),
            missing = knowledge.missing().len(),
            "oracle text resolved"
        );
        Ok(knowledge)
    }

    /// Look up a single name, retrying retryable transport failures.
    async fn resolve(&self, name: &str) -> Result<String, LookupError> {
        let mut attempt = 0;
        loop {
            match self.lookup.lookup(name).await {
                Err(LookupError::Transport {
                    ref reason,
                    retryable: true,
                }) if attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(card = %name, attempt, %reason, "retrying oracle lookup");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_lookups, MockOracle};
    use std::sync::Mutex;

    fn fast_config() -> AggregatorConfig {
        AggregatorConfig {
            concurrency: 3,
            max_retries: 2,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn oracle() -> Arc<MockOracle> {
        Arc::new(
            MockOracle::new()
                .with_card("Forest", "({T}: Add {G}.)")
                .with_card("Sol Ring", "{T}: Add {C}{C}.")
                .with_card("Island", "({T}: Add {U}.)"),
        )
    }

    #[tokio::test]
    async fn test_shared_card_looked_up_once() {
        let oracle = oracle();
        let player = DeckList::parse("30 Forest\n1 Sol Ring\n");
        let opponent = DeckList::parse("30 Island\n10 Forest\n");

        let knowledge = CardKnowledgeAggregator::new(oracle.clone())
            .with_config(fast_config())
            .aggregate(&[player, opponent])
            .await
            .unwrap();

        assert_eq!(knowledge.len(), 3);
        assert_lookups(&oracle, 3);
        assert_eq!(oracle.lookups_for("Forest"), 1);
    }

    #[tokio::test]
    async fn test_corpus_in_first_appearance_order() {
        let player = DeckList::parse("1 Sol Ring\n1 Forest\n");
        let opponent = DeckList::parse("1 Island\n1 Sol Ring\n");

        let knowledge = CardKnowledgeAggregator::new(oracle())
            .with_config(fast_config())
            .aggregate(&[player, opponent])
            .await
            .unwrap();

        assert_eq!(
            knowledge.corpus(),
            "Sol Ring:{T}: Add {C}{C}.\nForest:({T}: Add {G}.)\nIsland:({T}: Add {U}.)\n"
        );
        assert_eq!(
            knowledge.names().collect::<Vec<_>>(),
            vec!["Sol Ring", "Forest", "Island"]
        );
    }

    #[tokio::test]
    async fn test_unknown_card_recorded_empty() {
        let deck = DeckList::parse("1 Sol Ring\n1 Totally Fake Card\n1 Forest\n");

        let knowledge = CardKnowledgeAggregator::new(oracle())
            .with_config(fast_config())
            .aggregate(&[deck])
            .await
            .unwrap();

        assert_eq!(knowledge.len(), 3);
        assert_eq!(knowledge.get("Totally Fake Card"), Some(""));
        assert_eq!(knowledge.missing(), &["Totally Fake Card".to_string()]);
        assert!(knowledge.corpus().contains("Totally Fake Card:\n"));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let oracle = Arc::new(
            MockOracle::new()
                .with_card("Sol Ring", "{T}: Add {C}{C}.")
                .with_transient_failures("Sol Ring", 2),
        );
        let deck = DeckList::parse("1 Sol Ring\n");

        let knowledge = CardKnowledgeAggregator::new(oracle.clone())
            .with_config(fast_config())
            .aggregate(&[deck])
            .await
            .unwrap();

        assert_eq!(knowledge.get("Sol Ring"), Some("{T}: Add {C}{C}."));
        assert_eq!(oracle.lookups_for("Sol Ring"), 3);
    }

    #[tokio::test]
    async fn test_unavailable_database_aborts_run() {
        let oracle = Arc::new(MockOracle::new().unavailable());
        let deck = DeckList::parse("1 Sol Ring\n1 Forest\n");

        let result = CardKnowledgeAggregator::new(oracle)
            .with_config(fast_config())
            .aggregate(&[deck])
            .await;

        match result {
            Err(AggregateError::Unavailable { name, .. }) => assert_eq!(name, "Sol Ring"),
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_failure_not_retried() {
        let oracle = Arc::new(MockOracle::new().rejecting());
        let deck = DeckList::parse("1 Sol Ring\n");

        let result = CardKnowledgeAggregator::new(oracle.clone())
            .with_config(fast_config())
            .aggregate(&[deck])
            .await;

        assert!(result.is_err());
        assert_lookups(&oracle, 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer: ProgressObserver = Arc::new(move |p: &Progress<'_>| {
            sink.lock().unwrap().push((p.completed, p.total, p.name.to_string()));
        });

        let deck = DeckList::parse("1 Forest\n1 Sol Ring\n1 Island\n");
        CardKnowledgeAggregator::new(oracle())
            .with_config(fast_config())
            .with_progress(observer)
            .aggregate(&[deck])
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (1, 3, "Forest".to_string()),
                (2, 3, "Sol Ring".to_string()),
                (3, 3, "Island".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_decks_no_lookups() {
        let oracle = oracle();
        let knowledge = CardKnowledgeAggregator::new(oracle.clone())
            .aggregate(&[])
            .await
            .unwrap();

        assert!(knowledge.is_empty());
        assert_eq!(knowledge.corpus(), "");
        assert_lookups(&oracle, 0);
    }
}
