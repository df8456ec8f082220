//! Fixed-size corpus chunking.

use super::IndexError;
use serde::{Deserialize, Serialize};

/// Default maximum chunk length, in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// A contiguous slice of the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of this chunk in the sequence.
    pub index: usize,
    /// Character offset of the chunk start within the corpus.
    pub offset: usize,
    pub text: String,
}

/// Split `corpus` into chunks of at most `chunk_size` characters.
///
/// Boundaries ignore card lines. The final chunk keeps whatever remains, so
/// concatenating the chunks in order gives back the corpus.
pub fn split_text(corpus: &str, chunk_size: usize) -> Result<Vec<Chunk>, IndexError> {
    if chunk_size == 0 {
        return Err(IndexError::InvalidChunkSize);
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chars_in_chunk = 0;

    for (byte_index, _) in corpus.char_indices() {
        if chars_in_chunk == chunk_size {
            chunks.push(Chunk {
                index: chunks.len(),
                offset: chunks.len() * chunk_size,
                text: corpus[start..byte_index].to_string(),
            });
            start = byte_index;
            chars_in_chunk = 0;
        }
        chars_in_chunk += 1;
    }

    if chars_in_chunk > 0 {
        chunks.push(Chunk {
            index: chunks.len(),
            offset: chunks.len() * chunk_size,
            text: corpus[start..].to_string(),
        });
    }

    Ok(chunks)
}
