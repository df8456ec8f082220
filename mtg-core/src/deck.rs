//! Deck list parsing.
//!
//! Deck files hold one entry per line in the form `"<count> <card name>"`,
//! optionally followed by a sideboard section introduced by a line that
//! contains `SIDEBOARD`. Only the main deck is kept.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

/// Marker line that ends the main deck. Matched case-sensitively anywhere in the line.
pub const SIDEBOARD_MARKER: &str = "SIDEBOARD";

/// Errors from loading deck files.
#[derive(Debug, Error)]
pub enum DeckError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No .txt deck file found in {0}")]
    NoDeckFile(PathBuf),
}

/// Why a deck line was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedLine {
    #[error("count is not a positive integer")]
    InvalidCount,

    #[error("missing card name")]
    MissingName,
}

/// A skipped deck line, kept so callers can surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the source text.
    pub line_number: usize,
    pub line: String,
    pub reason: MalformedLine,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ({:?})", self.line_number, self.reason, self.line)
    }
}

/// One main-deck line: a card name and how many copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckEntry {
    pub count: u32,
    pub name: String,
}

impl DeckEntry {
    pub fn new(count: u32, name: impl Into<String>) -> Self {
        Self {
            count,
            name: name.into(),
        }
    }
}

/// A parsed main deck, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeckList {
    entries: Vec<DeckEntry>,
    warnings: Vec<ParseWarning>,
}

impl DeckList {
    /// Parse raw deck text.
    ///
    /// Blank lines are ignored and parsing stops at the sideboard marker.
    /// Malformed lines are skipped and recorded in [`DeckList::warnings`].
    pub fn parse(text: &str) -> Self {
        let mut deck = DeckList::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if line.contains(SIDEBOARD_MARKER) {
                break;
            }

            match parse_line(line) {
                Ok(entry) => deck.entries.push(entry),
                Err(reason) => {
                    let warning = ParseWarning {
                        line_number: index + 1,
                        line: line.to_string(),
                        reason,
                    };
                    tracing::warn!(%warning, "skipping malformed deck line");
                    deck.warnings.push(warning);
                }
            }
        }

        tracing::debug!(
            entries = deck.entries.len(),
            cards = deck.card_count(),
            skipped = deck.warnings.len(),
            "parsed deck list"
        );
        deck
    }

    /// Build a deck from already-validated entries. Zero-count entries are dropped.
    pub fn from_entries(entries: impl IntoIterator<Item = DeckEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .filter(|e| e.count > 0 && !e.name.trim().is_empty())
                .collect(),
            warnings: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[DeckEntry] {
        &self.entries
    }

    /// Lines that were skipped while parsing.
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of cards, counting copies.
    pub fn card_count(&self) -> usize {
        self.entries.iter().map(|e| e.count as usize).sum()
    }

    /// Distinct card names in order of first appearance.
    pub fn unique_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .map(|e| e.name.as_str())
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Expand every entry into `count` copies, keeping deck order.
    pub fn expand(&self) -> CardMultiset {
        CardMultiset(
            self.entries
                .iter()
                .flat_map(|e| std::iter::repeat(e.name.clone()).take(e.count as usize))
                .collect(),
        )
    }

    /// Serialize back to deck-file form, one `"<count> <name>"` line per entry.
    pub fn to_text(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{} {}\n", e.count, e.name))
            .collect()
    }
}

fn parse_line(line: &str) -> Result<DeckEntry, MalformedLine> {
    let mut tokens = line.split_whitespace();

    let count_token = tokens.next().ok_or(MalformedLine::InvalidCount)?;
    // "2x Forest" is common in exported lists.
    let count_token = count_token
        .strip_suffix(|c: char| c == 'x' || c == 'X')
        .unwrap_or(count_token);
    let count = count_token
        .parse::<u32>()
        .ok()
        .filter(|count| *count > 0)
        .ok_or(MalformedLine::InvalidCount)?;

    let name = tokens.collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        return Err(MalformedLine::MissingName);
    }

    Ok(DeckEntry { count, name })
}

/// A deck expanded to one name per physical card.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardMultiset(Vec<String>);

impl CardMultiset {
    pub fn new(cards: Vec<String>) -> Self {
        Self(cards)
    }

    pub fn cards(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    /// Copies per card name, ignoring order.
    pub fn counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for card in &self.0 {
            *counts.entry(card.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl From<Vec<String>> for CardMultiset {
    fn from(cards: Vec<String>) -> Self {
        Self(cards)
    }
}

/// Where the two decks of a match are read from.
#[derive(Debug, Clone)]
pub struct DeckSources {
    pub player_dir: PathBuf,
    pub opponent_dir: PathBuf,
}

impl DeckSources {
    /// Use `<root>/player` and `<root>/opponent`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            player_dir: root.join("player"),
            opponent_dir: root.join("opponent"),
        }
    }

    /// Load and parse both decks as `(player, opponent)`.
    pub async fn load(&self) -> Result<(DeckList, DeckList), DeckError> {
        let player = load_deck_dir(&self.player_dir).await?;
        let opponent = load_deck_dir(&self.opponent_dir).await?;
        Ok((player, opponent))
    }
}

impl Default for DeckSources {
    fn default() -> Self {
        Self::under("decks")
    }
}

/// Parse the first `.txt` file (by file name) in `dir`.
pub async fn load_deck_dir(dir: impl AsRef<Path>) -> Result<DeckList, DeckError> {
    let dir = dir.as_ref();
    let io_err = |source| DeckError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    let mut read_dir = fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = read_dir.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();

    let path = files
        .into_iter()
        .next()
        .ok_or_else(|| DeckError::NoDeckFile(dir.to_path_buf()))?;

    let text = fs::read_to_string(&path)
        .await
        .map_err(|source| DeckError::Io {
            path: path.clone(),
            source,
        })?;

    tracing::info!(path = %path.display(), "loaded deck file");
    Ok(DeckList::parse(&text))
}
