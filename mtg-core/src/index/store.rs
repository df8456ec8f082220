//! Embedding-backed retrieval index.

use super::chunk::Chunk;
use super::IndexError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an [`Embedder`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EmbedError(pub String);

/// Turns text into vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed corpus chunks. Must return one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed a search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| EmbedError("no embedding returned for query".into()))
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        (**self).embed_documents(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed_query(text).await
    }
}

#[async_trait]
impl Embedder for voyage::Voyage {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.embed(texts, voyage::InputType::Document)
            .await
            .map_err(|e| EmbedError(e.to_string()))
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed(&[text.to_string()], voyage::InputType::Query)
            .await
            .map_err(|e| EmbedError(e.to_string()))?
            .pop()
            .ok_or_else(|| EmbedError("no embedding returned for query".into()))
    }
}

/// A chunk returned by [`RetrievalIndex::retrieve`] with its similarity score.
#[derive(Debug, Clone, Copy)]
pub struct Retrieved<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

#[derive(Debug)]
struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
    norm: f32,
}

/// Immutable similarity index over corpus chunks.
///
/// Search is exhaustive cosine similarity, which is plenty for the few
/// hundred chunks two decks produce.
pub struct RetrievalIndex<E> {
    embedder: E,
    entries: Vec<Entry>,
    dimensions: usize,
}

impl<E: Embedder> RetrievalIndex<E> {
    /// Embed every chunk once and build the index.
    ///
    /// Any embedding failure fails the whole build.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: E,
        batch_size: usize,
    ) -> Result<Self, IndexError> {
        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimensions = 0;

        let mut chunks = chunks.into_iter().peekable();
        while chunks.peek().is_some() {
            let batch: Vec<Chunk> = chunks.by_ref().take(batch_size.max(1)).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();

            let vectors = embedder.embed_documents(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(IndexError::CountMismatch {
                    expected: batch.len(),
                    got: vectors.len(),
                });
            }

            for (chunk, vector) in batch.into_iter().zip(vectors) {
                if dimensions == 0 {
                    dimensions = vector.len();
                }
                if vector.is_empty() || vector.len() != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimensions,
                        got: vector.len(),
                    });
                }
                let norm = norm(&vector);
                entries.push(Entry {
                    chunk,
                    vector,
                    norm,
                });
            }
        }

        tracing::info!(chunks = entries.len(), dimensions, "built retrieval index");
        Ok(Self {
            embedder,
            entries,
            dimensions,
        })
    }

    /// The `k` chunks most similar to `query`, best first.
    ///
    /// Equal scores keep chunk order.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Retrieved<'_>>, IndexError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_query(query).await?;
        if query_vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query_vector.len(),
            });
        }
        let query_norm = norm(&query_vector);

        let mut scored: Vec<Retrieved<'_>> = self
            .entries
            .iter()
            .map(|entry| Retrieved {
                chunk: &entry.chunk,
                score: cosine(&query_vector, query_norm, &entry.vector, entry.norm),
            })
            .collect();

        // Stable sort: ties stay in insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);

        tracing::debug!(query, returned = scored.len(), "retrieved chunks");
        Ok(scored)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Indexed chunks in insertion order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let score = dot / (a_norm * b_norm);
    if score.is_nan() {
        0.0
    } else {
        score
    }
}
