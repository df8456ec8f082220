//! Minimal Scryfall card database client.
//!
//! Provides exact-name card lookups against the public Scryfall API. The
//! client spaces its requests so that a burst of lookups stays within
//! Scryfall's published rate guidance (no more than ten requests a second).

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

const API_BASE: &str = "https://api.scryfall.com";
const DEFAULT_USER_AGENT: &str = "mtg-core/0.1";

/// Minimum spacing between two requests from one client.
const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Errors that can occur when using the Scryfall client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Card not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            Error::NotFound(_) | Error::Parse(_) | Error::Config(_) => false,
        }
    }
}

/// Scryfall API client.
///
/// Cloning is cheap; clones share the rate limiter.
#[derive(Clone)]
pub struct Scryfall {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
    min_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl Scryfall {
    /// Create a client against the public API.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            min_interval: DEFAULT_MIN_INTERVAL,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    /// Override the API base URL (for mirrors or local fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the User-Agent sent with every request.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the minimum spacing between requests.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Look up a card by its exact name.
    pub async fn card_named(&self, name: &str) -> Result<Card, Error> {
        let headers = self.build_headers()?;
        self.throttle().await;

        let response = self
            .client
            .get(format!("{}/cards/named", self.base_url))
            .headers(headers)
            .query(&[("exact", name)])
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(name.to_string()));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.details)
                .unwrap_or(body);
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<Card>()
            .await
            .map_err(|e| Error::Parse(e.to_string()))
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| Error::Config(format!("Invalid user agent: {e}")))?,
        );
        Ok(headers)
    }

    /// Wait until at least `min_interval` has passed since the previous request.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for Scryfall {
    fn default() -> Self {
        Self::new()
    }
}

/// A card object as returned by Scryfall (the fields this client uses).
#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    pub name: String,
    #[serde(default)]
    pub mana_cost: Option<String>,
    #[serde(default)]
    pub type_line: Option<String>,
    #[serde(default)]
    pub oracle_text: Option<String>,
    #[serde(default)]
    pub card_faces: Vec<CardFace>,
}

impl Card {
    /// The card's rules text.
    ///
    /// Multi-faced cards carry their text on each face; those texts are
    /// joined with a `//` separator line.
    pub fn rules_text(&self) -> String {
        if let Some(ref text) = self.oracle_text {
            return text.clone();
        }

        self.card_faces
            .iter()
            .filter_map(|face| face.oracle_text.as_deref())
            .collect::<Vec<_>>()
            .join("\n//\n")
    }
}

/// One face of a multi-faced card.
#[derive(Debug, Clone, Deserialize)]
pub struct CardFace {
    pub name: String,
    #[serde(default)]
    pub oracle_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    details: String,
}
