use thiserror::Error;

use crate::hnsw::Metric;

/// Errors raised while building, querying or persisting a [`crate::index::VectorIndex`].
///
/// Everything here is configuration-level: callers abort instead of retrying.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("vector dimension mismatch: index expects {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("index was built with the {stored} metric but {configured} is configured")]
    MetricMismatch { stored: Metric, configured: Metric },

    #[error("vectors must have at least one dimension")]
    EmptyVector,

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptIndex(msg.into())
    }
}

/// Invalid chunker parameters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk_size must be greater than zero")]
    ZeroChunkSize,

    #[error("chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})")]
    InvalidOverlap {
        chunk_size: usize,
        chunk_overlap: usize,
    },
}
