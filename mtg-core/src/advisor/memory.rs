//! Conversation history for the rules advisor.
//!
//! Keeps a sliding window of completed question/answer turns and renders
//! the most recent ones into a bounded block of prompt text.

use serde::{Deserialize, Serialize};

/// Maximum number of turns kept in a history.
pub const MAX_TURNS: usize = 20;

/// One completed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }

    fn render(&self) -> String {
        format!("Player: {}\nAssistant: {}\n", self.question, self.answer)
    }
}

/// Completed turns, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TURNS)
    }

    /// Keep at most `max_turns` turns (at least one).
    pub fn with_capacity(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns: max_turns.max(1),
        }
    }

    /// Append a turn, dropping the oldest beyond the window.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }
    }

    /// A copy of this history with `turn` appended.
    pub fn with_turn(&self, turn: Turn) -> Self {
        let mut next = self.clone();
        next.push(turn);
        next
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Render the newest turns that fit in `budget` characters, oldest first.
    pub fn render_recent(&self, budget: usize) -> String {
        let mut used = 0;
        let mut kept = Vec::new();

        for turn in self.turns.iter().rev() {
            let text = turn.render();
            let size = text.chars().count();
            if used + size > budget {
                break;
            }
            used += size;
            kept.push(text);
        }

        kept.reverse();
        kept.concat()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_creation() {
        let history = ConversationHistory::new();
        assert!(history.is_empty());
        assert_eq!(history.render_recent(1000), "");
    }

    #[test]
    fn test_window_trims_oldest() {
        let mut history = ConversationHistory::new();
        for i in 0..30 {
            history.push(Turn::new(format!("Question {i}"), "Answer"));
        }

        assert_eq!(history.len(), MAX_TURNS);
        assert_eq!(history.turns()[0].question, "Question 10");
    }

    #[test]
    fn test_with_turn_leaves_original() {
        let history = ConversationHistory::new();
        let next = history.with_turn(Turn::new("Does Sol Ring tap for two?", "Yes."));

        assert!(history.is_empty());
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_render_recent_respects_budget() {
        let mut history = ConversationHistory::new();
        history.push(Turn::new("first", "one"));
        history.push(Turn::new("second", "two"));

        let full = history.render_recent(10_000);
        assert_eq!(
            full,
            "Player: first\nAssistant: one\nPlayer: second\nAssistant: two\n"
        );

        let newest_only = history.render_recent(32);
        assert_eq!(newest_only, "Player: second\nAssistant: two\n");

        assert_eq!(history.render_recent(5), "");
    }
}
