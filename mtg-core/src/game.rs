//! Starting game state for a two-player Commander match.
//!
//! Builds each player's zones from their expanded deck: a shuffled
//! library, an opening hand drawn from its top, and the commander. The
//! phase machine starts at turn 0, untap step, with the player active.
//! Nothing here advances phases; that belongs to the game logic.

use crate::deck::CardMultiset;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Commander starting life total.
pub const STARTING_LIFE: i32 = 40;

/// Cards in an opening hand.
pub const OPENING_HAND_SIZE: usize = 7;

/// Steps and phases of a turn, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GamePhase {
    #[default]
    Untap,
    Upkeep,
    Draw,
    PrecombatMain,
    Combat,
    PostcombatMain,
    End,
}

impl GamePhase {
    pub const ALL: [GamePhase; 7] = [
        GamePhase::Untap,
        GamePhase::Upkeep,
        GamePhase::Draw,
        GamePhase::PrecombatMain,
        GamePhase::Combat,
        GamePhase::PostcombatMain,
        GamePhase::End,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GamePhase::Untap => "Untap",
            GamePhase::Upkeep => "Upkeep",
            GamePhase::Draw => "Draw",
            GamePhase::PrecombatMain => "Precombat Main",
            GamePhase::Combat => "Combat",
            GamePhase::PostcombatMain => "Postcombat Main",
            GamePhase::End => "End",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Seat {
    #[default]
    Player,
    Opponent,
}

/// What happens to the commander's copy in the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CommanderRule {
    /// The commander stays in the library and can be drawn.
    #[default]
    KeepInLibrary,
    /// One copy is removed from the deck before shuffling.
    SetAside,
}

/// Options for building the starting state.
#[derive(Debug, Clone)]
pub struct SetupConfig {
    /// Seed for the shuffle; `None` draws one from the OS.
    pub seed: Option<u64>,
    pub opening_hand_size: usize,
    pub starting_life: i32,
    pub commander_rule: CommanderRule,
}

impl SetupConfig {
    pub fn new() -> Self {
        Self {
            seed: None,
            opening_hand_size: OPENING_HAND_SIZE,
            starting_life: STARTING_LIFE,
            commander_rule: CommanderRule::default(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_opening_hand_size(mut self, size: usize) -> Self {
        self.opening_hand_size = size;
        self
    }

    pub fn with_starting_life(mut self, life: i32) -> Self {
        self.starting_life = life;
        self
    }

    pub fn with_commander_rule(mut self, rule: CommanderRule) -> Self {
        self.commander_rule = rule;
        self
    }

    fn rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        }
    }
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One player's zones and life total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub life: i32,
    pub hand: Vec<String>,
    /// Top of the library is index 0.
    pub library: Vec<String>,
    pub graveyard: Vec<String>,
    pub exile: Vec<String>,
    pub battlefield: Vec<String>,
    /// Zero or one card.
    pub commander: Vec<String>,
    pub command_zone: Vec<String>,
}

impl PlayerState {
    /// Empty zones at `life`.
    pub fn new(life: i32) -> Self {
        Self {
            life,
            hand: Vec::new(),
            library: Vec::new(),
            graveyard: Vec::new(),
            exile: Vec::new(),
            battlefield: Vec::new(),
            commander: Vec::new(),
            command_zone: Vec::new(),
        }
    }

    /// Shuffle `deck` into a library and draw the opening hand.
    ///
    /// The commander is the first card in deck-list order, chosen before
    /// the shuffle.
    pub fn from_deck<R: Rng + ?Sized>(deck: &CardMultiset, config: &SetupConfig, rng: &mut R) -> Self {
        let mut state = Self::new(config.starting_life);
        let mut library = deck.cards().to_vec();

        if let Some(first) = deck.cards().first() {
            state.commander.push(first.clone());
            if config.commander_rule == CommanderRule::SetAside {
                library.remove(0);
            }
        }

        library.shuffle(rng);

        let hand_size = config.opening_hand_size.min(library.len());
        state.hand = library.drain(..hand_size).collect();
        state.library = library;
        state
    }

    /// Cards across hand, library and commander slot.
    pub fn card_count(&self) -> usize {
        self.hand.len() + self.library.len() + self.commander.len()
    }
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::new(STARTING_LIFE)
    }
}

/// Complete state of a match at setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub turn: u32,
    pub active_player: Seat,
    pub phase: GamePhase,
    pub player: PlayerState,
    pub opponent: PlayerState,
}

impl GameState {
    /// Set up a match. The player's deck is shuffled first, then the opponent's.
    pub fn new(player: &CardMultiset, opponent: &CardMultiset, config: &SetupConfig) -> Self {
        Self::with_rng(player, opponent, config, &mut config.rng())
    }

    /// Set up a match drawing randomness from `rng`.
    pub fn with_rng<R: Rng + ?Sized>(
        player: &CardMultiset,
        opponent: &CardMultiset,
        config: &SetupConfig,
        rng: &mut R,
    ) -> Self {
        let player = PlayerState::from_deck(player, config, rng);
        let opponent = PlayerState::from_deck(opponent, config, rng);

        tracing::info!(
            player_library = player.library.len(),
            opponent_library = opponent.library.len(),
            seeded = config.seed.is_some(),
            "initialized game state"
        );

        Self {
            turn: 0,
            active_player: Seat::Player,
            phase: GamePhase::Untap,
            player,
            opponent,
        }
    }

    pub fn seat(&self, seat: Seat) -> &PlayerState {
        match seat {
            Seat::Player => &self.player,
            Seat::Opponent => &self.opponent,
        }
    }

    pub fn active(&self) -> &PlayerState {
        self.seat(self.active_player)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::DeckList;
    use crate::testing::assert_conserves_cards;
    use proptest::prelude::*;

    fn commander_deck() -> CardMultiset {
        DeckList::parse("1 Atraxa, Praetors' Voice\n1 Sol Ring\n1 Arcane Signet\n37 Forest\n60 Island\n")
            .expand()
    }

    #[test]
    fn test_initial_phase_machine() {
        let deck = commander_deck();
        let state = GameState::new(&deck, &deck, &SetupConfig::new().with_seed(1));

        assert_eq!(state.turn, 0);
        assert_eq!(state.active_player, Seat::Player);
        assert_eq!(state.phase, GamePhase::Untap);
        assert_eq!(state.active().life, STARTING_LIFE);
        assert!(state.player.graveyard.is_empty());
        assert!(state.player.exile.is_empty());
        assert!(state.player.battlefield.is_empty());
        assert!(state.player.command_zone.is_empty());
    }

    #[test]
    fn test_opening_hand_and_library_sizes() {
        let deck = commander_deck();
        let state = GameState::new(&deck, &deck, &SetupConfig::new().with_seed(7));

        assert_eq!(state.player.hand.len(), 7);
        assert_eq!(state.player.library.len(), 100 - 7);
        assert_eq!(state.player.commander, vec!["Atraxa, Praetors' Voice".to_string()]);
        assert_conserves_cards(&deck, &state.player, CommanderRule::KeepInLibrary);
    }

    #[test]
    fn test_set_aside_commander_cannot_be_drawn() {
        let deck = commander_deck();
        let config = SetupConfig::new()
            .with_seed(3)
            .with_commander_rule(CommanderRule::SetAside);
        let state = GameState::new(&deck, &deck, &config);

        let name = "Atraxa, Praetors' Voice";
        assert!(!state.player.hand.iter().any(|c| c == name));
        assert!(!state.player.library.iter().any(|c| c == name));
        assert_eq!(state.player.library.len(), 100 - 1 - 7);
        assert_conserves_cards(&deck, &state.player, CommanderRule::SetAside);
    }

    #[test]
    fn test_small_and_empty_decks() {
        let small = DeckList::parse("3 Forest\n").expand();
        let empty = CardMultiset::default();
        let state = GameState::new(&small, &empty, &SetupConfig::new().with_seed(0));

        assert_eq!(state.player.hand.len(), 3);
        assert!(state.player.library.is_empty());
        assert_eq!(state.player.commander.len(), 1);

        assert!(state.opponent.hand.is_empty());
        assert!(state.opponent.library.is_empty());
        assert!(state.opponent.commander.is_empty());
    }

    #[test]
    fn test_same_seed_same_state() {
        let deck = commander_deck();
        let config = SetupConfig::new().with_seed(42);

        assert_eq!(
            GameState::new(&deck, &deck, &config),
            GameState::new(&deck, &deck, &config)
        );
    }

    #[test]
    fn test_shuffle_changes_order() {
        let deck: CardMultiset = (0..100).map(|i| format!("Card {i}")).collect::<Vec<_>>().into();
        let state = GameState::new(&deck, &deck, &SetupConfig::new().with_seed(9));

        let mut dealt = state.player.hand.clone();
        dealt.extend(state.player.library.iter().cloned());
        assert_ne!(dealt, deck.cards());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(GamePhase::ALL.len(), 7);
        assert_eq!(GamePhase::PrecombatMain.to_string(), "Precombat Main");
        assert_eq!(GamePhase::default(), GamePhase::Untap);
    }

    #[test]
    fn test_state_serializes() {
        let deck = DeckList::parse("1 Sol Ring\n").expand();
        let state = GameState::new(&deck, &deck, &SetupConfig::new().with_seed(5));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["phase"], "Untap");
        assert_eq!(json["active_player"], "Player");
        assert_eq!(json["player"]["life"], 40);
    }

    proptest! {
        /// Property: hand = min(7, deck), library = deck - hand, at most one commander.
        #[test]
        fn prop_opening_hand_sizes(size in 0usize..120, seed in any::<u64>()) {
            let deck: CardMultiset = (0..size).map(|i| format!("Card {}", i % 13)).collect::<Vec<_>>().into();
            let state = GameState::new(&deck, &deck, &SetupConfig::new().with_seed(seed));

            prop_assert_eq!(state.player.hand.len(), size.min(OPENING_HAND_SIZE));
            prop_assert_eq!(state.player.library.len(), size - state.player.hand.len());
            prop_assert!(state.player.commander.len() <= 1);
        }
    }
}
