//! Text indexing over the card knowledge corpus.
//!
//! The corpus is cut into fixed-size chunks, each chunk is embedded once,
//! and the resulting [`RetrievalIndex`] answers nearest-neighbour queries.

pub mod chunk;
pub mod store;

pub use chunk::{split_text, Chunk, DEFAULT_CHUNK_SIZE};
pub use store::{EmbedError, Embedder, RetrievalIndex, Retrieved};

use thiserror::Error;

/// Errors from chunking, building or querying an index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("chunk size must be at least 1")]
    InvalidChunkSize,

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("embedding has {got} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Chunking and batching settings.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,

    /// Chunks sent to the embedder per request.
    pub batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            batch_size: 64,
        }
    }
}

/// Split `corpus` and build an index over the chunks.
pub async fn build_index<E: Embedder>(
    corpus: &str,
    config: &IndexConfig,
    embedder: E,
) -> Result<RetrievalIndex<E>, IndexError> {
    let chunks = split_text(corpus, config.chunk_size)?;
    RetrievalIndex::build(chunks, embedder, config.batch_size).await
}
