//! Testing utilities for match preparation.
//!
//! This module provides deterministic stand-ins for the external services:
//! - `MockOracle` for card lookups without Scryfall
//! - `HashingEmbedder` and `FailingEmbedder` for indexing without Voyage
//! - `ScriptedModel` for advisor turns without Claude
//! - Assertion helpers for lookup counts and card conservation

use crate::advisor::{LanguageModel, ModelError};
use crate::deck::CardMultiset;
use crate::game::{CommanderRule, PlayerState};
use crate::index::{EmbedError, Embedder};
use crate::oracle::{LookupError, OracleLookup};
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

// ============================================================================
// Oracle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Availability {
    Up,
    /// Every lookup fails with a retryable transport error.
    Down,
    /// Every lookup fails with a non-retryable transport error.
    Rejecting,
}

/// A card database with a fixed set of cards.
///
/// Names it does not know are reported as not found. Every call is
/// counted, including retries.
pub struct MockOracle {
    cards: HashMap<String, String>,
    availability: Availability,
    transient_failures: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<String>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            cards: HashMap::new(),
            availability: Availability::Up,
            transient_failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Add a card and its oracle text.
    pub fn with_card(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.cards.insert(name.into(), text.into());
        self
    }

    /// Fail the first `count` lookups of `name` with a retryable error.
    pub fn with_transient_failures(self, name: impl Into<String>, count: usize) -> Self {
        self.transient_failures
            .lock()
            .unwrap()
            .insert(name.into(), count);
        self
    }

    /// Make every lookup fail as if the network were down.
    pub fn unavailable(mut self) -> Self {
        self.availability = Availability::Down;
        self
    }

    /// Make every lookup fail with an error that retrying cannot fix.
    pub fn rejecting(mut self) -> Self {
        self.availability = Availability::Rejecting;
        self
    }

    /// Total lookups performed.
    pub fn lookups(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Lookups performed for one name.
    pub fn lookups_for(&self, name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| called.as_str() == name)
            .count()
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OracleLookup for MockOracle {
    async fn lookup(&self, name: &str) -> Result<String, LookupError> {
        self.calls.lock().unwrap().push(name.to_string());

        match self.availability {
            Availability::Down => return Err(LookupError::transport("connection refused")),
            Availability::Rejecting => {
                return Err(LookupError::Transport {
                    reason: "403 Forbidden".into(),
                    retryable: false,
                })
            }
            Availability::Up => {}
        }

        {
            let mut failures = self.transient_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(LookupError::transport("503 Service Unavailable"));
                }
            }
        }

        self.cards
            .get(name)
            .cloned()
            .ok_or_else(|| LookupError::NotFound(name.to_string()))
    }
}

// ============================================================================
// Embedders
// ============================================================================

/// Deterministic bag-of-words embedder.
///
/// Each lowercase alphanumeric token is hashed into one of `dimensions`
/// buckets. Texts sharing words score higher, which is enough to exercise
/// retrieval ordering offline.
pub struct HashingEmbedder {
    dimensions: usize,
    batches: AtomicUsize,
    documents: AtomicUsize,
    queries: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            batches: AtomicUsize::new(0),
            documents: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Embed one text.
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }
        vector
    }

    /// Calls to `embed_documents`.
    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    /// Texts passed to `embed_documents`, summed over calls.
    pub fn documents_embedded(&self) -> usize {
        self.documents.load(Ordering::SeqCst)
    }

    /// Calls to `embed_query`.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.documents.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }
}

/// Embedder that succeeds for a number of batches, then fails.
pub struct FailingEmbedder {
    inner: HashingEmbedder,
    remaining: AtomicUsize,
}

impl FailingEmbedder {
    pub fn after_batches(batches: usize) -> Self {
        Self {
            inner: HashingEmbedder::new(16),
            remaining: AtomicUsize::new(batches),
        }
    }
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let allowed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !allowed {
            return Err(EmbedError("embedding service returned 500".into()));
        }
        self.inner.embed_documents(texts).await
    }
}

// ============================================================================
// Language model
// ============================================================================

/// A language model that returns scripted answers in order.
///
/// Records every prompt it receives. Once the script runs out it answers
/// with a fixed notice.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<String>>,
    always_fail: bool,
    contexts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            always_fail: false,
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// A model whose every call fails.
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new(Vec::<String>::new())
        }
    }

    /// Queue another answer.
    pub fn queue(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }

    /// Every prompt received, in order.
    pub fn contexts(&self) -> Vec<String> {
        self.contexts.lock().unwrap().clone()
    }

    pub fn last_context(&self) -> Option<String> {
        self.contexts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, context: &str) -> Result<String, ModelError> {
        self.contexts.lock().unwrap().push(context.to_string());

        if self.always_fail {
            return Err(ModelError::Other("model unavailable".into()));
        }

        Ok(self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "The model has no more scripted answers.".to_string()))
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the oracle was called exactly `expected` times.
#[track_caller]
pub fn assert_lookups(oracle: &MockOracle, expected: usize) {
    let actual = oracle.lookups();
    assert_eq!(
        actual, expected,
        "Expected {expected} oracle lookups, got {actual}"
    );
}

/// Assert a player's hand, library and commander account for every card of `deck`.
#[track_caller]
pub fn assert_conserves_cards(deck: &CardMultiset, state: &PlayerState, rule: CommanderRule) {
    let mut dealt: Vec<String> = state.hand.iter().chain(&state.library).cloned().collect();
    if rule == CommanderRule::SetAside {
        dealt.extend(state.commander.iter().cloned());
    }

    let dealt = CardMultiset::new(dealt);
    assert_eq!(
        dealt.counts(),
        deck.counts(),
        "Expected hand and library to hold exactly the deck's cards"
    );
}
