//! Conversational rules advisor.
//!
//! Answers questions about the cards in play by retrieving the most
//! relevant oracle-text chunks, assembling them with recent conversation
//! into a bounded prompt, and handing that prompt to a [`LanguageModel`].
//! A turn is committed to the history only when the model call succeeds.

pub mod memory;
pub mod model;

pub use memory::{ConversationHistory, Turn, MAX_TURNS};
pub use model::{ClaudeModel, LanguageModel, ModelError};

use crate::index::{Embedder, IndexError, RetrievalIndex, Retrieved};
use thiserror::Error;

const RULES_PROMPT: &str = include_str!("prompts/rules_qa.txt");
const CONDENSE_PROMPT: &str = include_str!("prompts/condense.txt");

const REFERENCE_HEADER: &str = "\n## Card Reference\n";
const HISTORY_HEADER: &str = "\n## Conversation So Far\n";

/// Errors from a single advisor turn.
#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("prompt needs {needed} characters before any card text, limit is {limit}")]
    ContextTooLarge { needed: usize, limit: usize },

    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error("model call failed: {0}")]
    Model(#[from] ModelError),
}

/// Settings for the advisor.
#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    /// Chunks retrieved per question.
    pub top_k: usize,

    /// Upper bound on the assembled prompt, in characters.
    pub max_context_chars: usize,

    /// Rewrite follow-up questions into standalone ones before retrieval.
    pub condense_question: bool,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            max_context_chars: 12_000,
            condense_question: false,
        }
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// Indices of the chunks that were placed in the prompt.
    pub sources: Vec<usize>,
    /// The input history with this turn appended.
    pub history: ConversationHistory,
}

/// Question answering over a [`RetrievalIndex`].
pub struct RulesAdvisor<E, M> {
    index: RetrievalIndex<E>,
    model: M,
    config: AdvisorConfig,
}

impl<E: Embedder, M: LanguageModel> RulesAdvisor<E, M> {
    pub fn new(index: RetrievalIndex<E>, model: M) -> Self {
        Self {
            index,
            model,
            config: AdvisorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: AdvisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn index(&self) -> &RetrievalIndex<E> {
        &self.index
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.config
    }

    /// Answer `question` in the context of `history`.
    ///
    /// `history` is never modified; the returned [`Answer`] carries the
    /// extended history.
    pub async fn ask(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> Result<Answer, AdvisorError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AdvisorError::EmptyQuestion);
        }

        let search_query = if self.config.condense_question && !history.is_empty() {
            self.condense(question, history).await?
        } else {
            question.to_string()
        };

        let retrieved = self.index.retrieve(&search_query, self.config.top_k).await?;
        let (context, sources) = self.build_context(question, &retrieved, history)?;

        tracing::debug!(
            chunks = sources.len(),
            context_chars = context.chars().count(),
            "asking model"
        );
        let answer = self.model.complete(&context).await?.trim().to_string();

        tracing::info!(question, answer_chars = answer.len(), "advisor turn complete");
        Ok(Answer {
            history: history.with_turn(Turn::new(question, answer.clone())),
            answer,
            sources,
        })
    }

    /// Start a conversation with an empty history.
    pub fn conversation(&self) -> Conversation<'_, E, M> {
        Conversation {
            advisor: self,
            history: ConversationHistory::new(),
        }
    }

    async fn condense(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> Result<String, AdvisorError> {
        let prompt = format!(
            "{CONDENSE_PROMPT}\n## Conversation\n{}\n## Follow-up question\n{question}\n",
            history.render_recent(self.config.max_context_chars / 2)
        );

        let standalone = self.model.complete(&prompt).await?;
        let standalone = standalone.trim();
        if standalone.is_empty() {
            return Ok(question.to_string());
        }
        tracing::debug!(original = question, standalone, "condensed follow-up question");
        Ok(standalone.to_string())
    }

    /// Assemble the prompt: instructions, reference chunks, recent turns, question.
    ///
    /// The result never exceeds `max_context_chars`. Chunks are added
    /// best-first while they fit; the remaining budget goes to the newest
    /// history turns.
    fn build_context(
        &self,
        question: &str,
        retrieved: &[Retrieved<'_>],
        history: &ConversationHistory,
    ) -> Result<(String, Vec<usize>), AdvisorError> {
        let question_block = format!("\n## Question\n{question}\n");
        let limit = self.config.max_context_chars;
        let fixed = RULES_PROMPT.chars().count()
            + REFERENCE_HEADER.chars().count()
            + question_block.chars().count();
        if fixed > limit {
            return Err(AdvisorError::ContextTooLarge {
                needed: fixed,
                limit,
            });
        }
        let mut budget = limit - fixed;

        let mut reference = String::new();
        let mut sources = Vec::new();
        for hit in retrieved {
            let block = format!("{}\n---\n", hit.chunk.text);
            let size = block.chars().count();
            if size > budget {
                continue;
            }
            budget -= size;
            reference.push_str(&block);
            sources.push(hit.chunk.index);
        }

        let mut context = String::from(RULES_PROMPT);
        context.push_str(REFERENCE_HEADER);
        context.push_str(&reference);

        let recent = budget
            .checked_sub(HISTORY_HEADER.chars().count())
            .map(|remaining| history.render_recent(remaining))
            .unwrap_or_default();
        if !recent.is_empty() {
            context.push_str(HISTORY_HEADER);
            context.push_str(&recent);
        }

        context.push_str(&question_block);
        Ok((context, sources))
    }
}

/// A stateful conversation that commits each turn only on success.
pub struct Conversation<'a, E, M> {
    advisor: &'a RulesAdvisor<E, M>,
    history: ConversationHistory,
}

impl<'a, E: Embedder, M: LanguageModel> Conversation<'a, E, M> {
    /// Continue from an existing history.
    pub fn resume(advisor: &'a RulesAdvisor<E, M>, history: ConversationHistory) -> Self {
        Self { advisor, history }
    }

    /// Ask a question; on error the history is left as it was.
    pub async fn ask(&mut self, question: &str) -> Result<String, AdvisorError> {
        let answer = self.advisor.ask(question, &self.history).await?;
        self.history = answer.history;
        Ok(answer.answer)
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn into_history(self) -> ConversationHistory {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build_index, IndexConfig};
    use crate::testing::{HashingEmbedder, ScriptedModel};
    use std::sync::Arc;

    const CORPUS: &str = "Sol Ring:{T}: Add {C}{C}.\n\
        Counterspell:Counter target spell.\n\
        Forest:({T}: Add {G}.)\n";

    async fn advisor(
        model: Arc<ScriptedModel>,
        config: AdvisorConfig,
    ) -> RulesAdvisor<HashingEmbedder, Arc<ScriptedModel>> {
        let index_config = IndexConfig {
            chunk_size: 200,
            batch_size: 8,
        };
        let index = build_index(CORPUS, &index_config, HashingEmbedder::new(128))
            .await
            .unwrap();
        RulesAdvisor::new(index, model).with_config(config)
    }

    #[tokio::test]
    async fn test_ask_appends_turn() {
        let model = Arc::new(ScriptedModel::new(vec!["It counters target spell."]));
        let advisor = advisor(model.clone(), AdvisorConfig::default()).await;

        let history = ConversationHistory::new();
        let answer = advisor
            .ask("  What does Counterspell do?  ", &history)
            .await
            .unwrap();

        assert_eq!(answer.answer, "It counters target spell.");
        assert!(history.is_empty());
        assert_eq!(answer.history.len(), 1);
        assert_eq!(answer.history.turns()[0].question, "What does Counterspell do?");

        let context = model.last_context().unwrap();
        assert!(context.contains("Counterspell:Counter target spell."));
        assert!(context.ends_with("## Question\nWhat does Counterspell do?\n"));
    }

    #[tokio::test]
    async fn test_model_failure_keeps_history() {
        let model = Arc::new(ScriptedModel::failing());
        let advisor = advisor(model, AdvisorConfig::default()).await;

        let mut conversation = advisor.conversation();
        let result = conversation.ask("What does Sol Ring do?").await;

        assert!(matches!(result, Err(AdvisorError::Model(_))));
        assert!(conversation.history().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_includes_previous_turns() {
        let model = Arc::new(ScriptedModel::new(vec![
            "Sol Ring adds two colorless mana.",
            "Yes, it can pay for your commander.",
        ]));
        let advisor = advisor(model.clone(), AdvisorConfig::default()).await;

        let mut conversation = advisor.conversation();
        conversation.ask("What does Sol Ring do?").await.unwrap();
        conversation.ask("Can that pay for my commander?").await.unwrap();

        assert_eq!(conversation.history().len(), 2);
        let context = model.last_context().unwrap();
        assert!(context.contains("## Conversation So Far\nPlayer: What does Sol Ring do?"));
    }

    #[tokio::test]
    async fn test_context_is_bounded() {
        let model = Arc::new(ScriptedModel::new(vec!["ok", "ok"]));
        let config = AdvisorConfig {
            top_k: 4,
            max_context_chars: RULES_PROMPT.chars().count() + 120,
            condense_question: false,
        };
        let advisor = advisor(model.clone(), config).await;

        let mut history = ConversationHistory::new();
        history.push(Turn::new("x".repeat(500), "y".repeat(500)));
        advisor.ask("What does Forest do?", &history).await.unwrap();

        let context = model.last_context().unwrap();
        assert!(context.chars().count() <= RULES_PROMPT.chars().count() + 120);
        assert!(!context.contains("## Conversation So Far"));
    }

    #[tokio::test]
    async fn test_context_fits_limit_exactly() {
        let question = "What does Forest do?";
        let fixed = RULES_PROMPT.chars().count()
            + REFERENCE_HEADER.chars().count()
            + format!("\n## Question\n{question}\n").chars().count();

        let model = Arc::new(ScriptedModel::new(vec!["ok"]));
        let index = build_index(
            "Forest:({T}: Add {G}.)\n",
            &IndexConfig::default(),
            HashingEmbedder::new(32),
        )
        .await
        .unwrap();
        let chunk_block = "Forest:({T}: Add {G}.)\n\n---\n".chars().count();
        let config = AdvisorConfig {
            max_context_chars: fixed + chunk_block,
            ..AdvisorConfig::default()
        };
        let advisor = RulesAdvisor::new(index, model.clone()).with_config(config);

        let mut history = ConversationHistory::new();
        history.push(Turn::new("Is it a land?", "Yes."));
        let answer = advisor.ask(question, &history).await.unwrap();

        let context = model.last_context().unwrap();
        assert_eq!(answer.sources, vec![0]);
        assert_eq!(context.chars().count(), fixed + chunk_block);
        assert!(!context.contains("## Conversation So Far"));
    }

    #[tokio::test]
    async fn test_fixed_prompt_over_limit_rejected() {
        let model = Arc::new(ScriptedModel::new(vec!["ok"]));
        let config = AdvisorConfig {
            max_context_chars: RULES_PROMPT.chars().count(),
            ..AdvisorConfig::default()
        };
        let advisor = advisor(model.clone(), config).await;

        let result = advisor
            .ask("What does Forest do?", &ConversationHistory::new())
            .await;
        assert!(matches!(result, Err(AdvisorError::ContextTooLarge { .. })));
        assert!(model.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_condense_uses_standalone_question() {
        let model = Arc::new(ScriptedModel::new(vec![
            "Counterspell counters a spell.",
            "What does Counterspell do?",
            "It counters target spell.",
        ]));
        let config = AdvisorConfig {
            condense_question: true,
            ..AdvisorConfig::default()
        };
        let advisor = advisor(model.clone(), config).await;

        let mut conversation = advisor.conversation();
        conversation.ask("Tell me about Counterspell").await.unwrap();
        conversation.ask("And what does it do?").await.unwrap();

        let contexts = model.contexts();
        assert_eq!(contexts.len(), 3);
        assert!(contexts[1].contains("## Follow-up question\nAnd what does it do?"));
        assert!(contexts[2].ends_with("## Question\nAnd what does it do?\n"));
    }

    #[tokio::test]
    async fn test_empty_question_rejected() {
        let model = Arc::new(ScriptedModel::new(Vec::<String>::new()));
        let advisor = advisor(model.clone(), AdvisorConfig::default()).await;

        let result = advisor.ask("   ", &ConversationHistory::new()).await;
        assert!(matches!(result, Err(AdvisorError::EmptyQuestion)));
        assert!(model.contexts().is_empty());
    }
}
