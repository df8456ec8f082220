//! MatchSession - the primary public API for match preparation.
//!
//! Runs the whole pipeline once: load both decks, resolve their oracle
//! text, index it for retrieval, and deal the starting game state. The
//! finished session answers rules questions about the cards in play.

use crate::advisor::{
    AdvisorError, Answer, ClaudeModel, Conversation, ConversationHistory, LanguageModel,
    RulesAdvisor,
};
use crate::config::{ConfigError, Credentials, MatchConfig};
use crate::deck::{DeckError, DeckList};
use crate::game::GameState;
use crate::index::{build_index, Embedder, IndexError, RetrievalIndex};
use crate::oracle::{AggregateError, CardKnowledge, CardKnowledgeAggregator, OracleLookup};
use claude::Claude;
use scryfall::Scryfall;
use thiserror::Error;
use voyage::Voyage;

/// Errors from preparing or using a match session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Deck error: {0}")]
    Deck(#[from] DeckError),

    #[error("Card lookup error: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Advisor error: {0}")]
    Advisor(#[from] AdvisorError),
}

/// A prepared match between two decks.
pub struct MatchSession<E, M> {
    player_deck: DeckList,
    opponent_deck: DeckList,
    knowledge: CardKnowledge,
    advisor: RulesAdvisor<E, M>,
    game: GameState,
}

impl MatchSession<Voyage, ClaudeModel> {
    /// Prepare a match against the hosted services.
    ///
    /// Requires `ANTHROPIC_API_KEY` and `VOYAGE_API_KEY`.
    pub async fn prepare(config: MatchConfig) -> Result<Self, SessionError> {
        let credentials = Credentials::from_env()?;
        let (player, opponent) = config.decks.load().await?;

        let mut claude = Claude::new(credentials.anthropic_api_key);
        if let Some(ref model) = config.model {
            claude = claude.with_model(model);
        }
        let model = ClaudeModel::new(claude).with_max_tokens(config.max_tokens);

        let mut voyage = Voyage::new(credentials.voyage_api_key);
        if let Some(ref model) = config.embedding_model {
            voyage = voyage.with_model(model);
        }

        Self::prepare_with(&config, player, opponent, Scryfall::new(), voyage, model).await
    }
}

impl<E: Embedder, M: LanguageModel> MatchSession<E, M> {
    /// Prepare a match from parsed decks and explicit collaborators.
    pub async fn prepare_with<L: OracleLookup>(
        config: &MatchConfig,
        player: DeckList,
        opponent: DeckList,
        lookup: L,
        embedder: E,
        model: M,
    ) -> Result<Self, SessionError> {
        for (seat, deck) in [("player", &player), ("opponent", &opponent)] {
            tracing::info!(
                seat,
                cards = deck.card_count(),
                unique = deck.unique_names().len(),
                skipped_lines = deck.warnings().len(),
                "loaded deck"
            );
        }

        let mut aggregator =
            CardKnowledgeAggregator::new(lookup).with_config(config.aggregator.clone());
        if let Some(ref observer) = config.progress {
            aggregator = aggregator.with_progress(observer.clone());
        }
        let decks = [player, opponent];
        let knowledge = aggregator.aggregate(&decks).await?;
        let [player, opponent] = decks;

        let index = build_index(&knowledge.corpus(), &config.index, embedder).await?;
        let advisor = RulesAdvisor::new(index, model).with_config(config.advisor.clone());

        let game = GameState::new(&player.expand(), &opponent.expand(), &config.setup);

        tracing::info!(
            cards = knowledge.len(),
            missing = knowledge.missing().len(),
            chunks = advisor.index().len(),
            "match prepared"
        );

        Ok(Self {
            player_deck: player,
            opponent_deck: opponent,
            knowledge,
            advisor,
            game,
        })
    }

    pub fn player_deck(&self) -> &DeckList {
        &self.player_deck
    }

    pub fn opponent_deck(&self) -> &DeckList {
        &self.opponent_deck
    }

    pub fn knowledge(&self) -> &CardKnowledge {
        &self.knowledge
    }

    pub fn index(&self) -> &RetrievalIndex<E> {
        self.advisor.index()
    }

    pub fn advisor(&self) -> &RulesAdvisor<E, M> {
        &self.advisor
    }

    /// The starting game state.
    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Answer a rules question given the conversation so far.
    pub async fn ask(
        &self,
        question: &str,
        history: &ConversationHistory,
    ) -> Result<Answer, SessionError> {
        Ok(self.advisor.ask(question, history).await?)
    }

    /// Start a conversation about this match.
    pub fn conversation(&self) -> Conversation<'_, E, M> {
        self.advisor.conversation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{GamePhase, Seat};
    use crate::testing::{assert_lookups, HashingEmbedder, MockOracle, ScriptedModel};
    use std::sync::Arc;

    fn oracle() -> Arc<MockOracle> {
        Arc::new(
            MockOracle::new()
                .with_card("Sol Ring", "{T}: Add {C}{C}.")
                .with_card("Forest", "({T}: Add {G}.)")
                .with_card("Island", "({T}: Add {U}.)")
                .with_card("Counterspell", "Counter target spell."),
        )
    }

    #[tokio::test]
    async fn test_prepare_with_mocks() {
        let oracle = oracle();
        let config = MatchConfig::new().with_seed(11);

        let session = MatchSession::prepare_with(
            &config,
            DeckList::parse("1 Sol Ring\n20 Forest\n"),
            DeckList::parse("1 Counterspell\n20 Island\n"),
            oracle.clone(),
            HashingEmbedder::new(64),
            ScriptedModel::new(vec!["Sol Ring taps for two colorless mana."]),
        )
        .await
        .unwrap();

        assert_lookups(&oracle, 4);
        assert_eq!(session.knowledge().len(), 4);
        assert!(!session.index().is_empty());

        let game = session.game();
        assert_eq!(game.turn, 0);
        assert_eq!(game.active_player, Seat::Player);
        assert_eq!(game.phase, GamePhase::Untap);
        assert_eq!(game.player.commander, vec!["Sol Ring".to_string()]);
        assert_eq!(game.opponent.commander, vec!["Counterspell".to_string()]);

        let answer = session
            .ask("What does Sol Ring do?", &ConversationHistory::new())
            .await
            .unwrap();
        assert_eq!(answer.answer, "Sol Ring taps for two colorless mana.");
        assert_eq!(answer.history.len(), 1);
    }

    #[tokio::test]
    async fn test_prepare_aborts_when_database_down() {
        let result = MatchSession::prepare_with(
            &MatchConfig::new().with_max_retries(0),
            DeckList::parse("1 Sol Ring\n"),
            DeckList::parse("1 Island\n"),
            MockOracle::new().unavailable(),
            HashingEmbedder::new(8),
            ScriptedModel::new(Vec::<String>::new()),
        )
        .await;

        assert!(matches!(result, Err(SessionError::Aggregate(_))));
    }

    #[tokio::test]
    async fn test_advisor_error_converts() {
        let session = MatchSession::prepare_with(
            &MatchConfig::new().with_seed(1),
            DeckList::parse("1 Forest\n"),
            DeckList::parse("1 Island\n"),
            oracle(),
            HashingEmbedder::new(8),
            ScriptedModel::failing(),
        )
        .await
        .unwrap();

        let result = session.ask("Is Forest a land?", &ConversationHistory::new()).await;
        assert!(matches!(result, Err(SessionError::Advisor(AdvisorError::Model(_)))));
    }
}
