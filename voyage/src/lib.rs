//! Minimal Voyage AI embeddings client.
//!
//! Voyage is the embedding provider Anthropic recommends alongside Claude.
//! This client covers the single `/embeddings` endpoint, distinguishing
//! document and query inputs so retrieval gets the asymmetric encodings.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_BASE: &str = "https://api.voyageai.com/v1";
const DEFAULT_MODEL: &str = "voyage-3";

/// Errors that can occur when using the Voyage client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API key not configured")]
    NoApiKey,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// How an input will be used; Voyage prefixes inputs differently for each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Document,
    Query,
}

/// Voyage API client.
#[derive(Clone)]
pub struct Voyage {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl Voyage {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Create a client from the VOYAGE_API_KEY environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let api_key = std::env::var("VOYAGE_API_KEY").map_err(|_| Error::NoApiKey)?;
        Ok(Self::new(api_key))
    }

    /// Set the embedding model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed a batch of inputs. The returned vectors are in input order.
    pub async fn embed(
        &self,
        inputs: &[String],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>, Error> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let headers = self.build_headers()?;
        let request = ApiRequest {
            input: inputs,
            model: &self.model,
            input_type,
        };

        let response = self
            .client
            .post(format!("{API_BASE}/embeddings"))
            .headers(headers)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Parse(e.to_string()))?;

        into_vectors(api_response, inputs.len())
    }

    fn build_headers(&self) -> Result<HeaderMap, Error> {
        if self.api_key.is_empty() {
            return Err(Error::NoApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| Error::Config(format!("Invalid API key: {e}")))?,
        );
        Ok(headers)
    }
}

/// Order embeddings by their `index` field and check every input got one.
fn into_vectors(response: ApiResponse, expected: usize) -> Result<Vec<Vec<f32>>, Error> {
    let mut data = response.data;
    if data.len() != expected {
        return Err(Error::Parse(format!(
            "expected {expected} embeddings, got {}",
            data.len()
        )));
    }

    data.sort_by_key(|d| d.index);
    if data.iter().enumerate().any(|(i, d)| d.index != i) {
        return Err(Error::Parse("embedding indices are not contiguous".into()));
    }

    Ok(data.into_iter().map(|d| d.embedding).collect())
}

// ============================================================================
// Internal API types
// ============================================================================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    input: &'a [String],
    model: &'a str,
    input_type: InputType,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    data: Vec<ApiEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbedding {
    embedding: Vec<f32>,
    index: usize,
}
