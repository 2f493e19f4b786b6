use crate::hnsw::{HnswParams, Metric};

/// Configuration for chunking and indexing a schema.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexConfig {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks of one source.
    pub chunk_overlap: usize,
    /// Neighbors linked per node per layer (layer 0 keeps twice as many).
    pub m: usize,
    /// Beam width used while inserting.
    pub ef_construction: usize,
    /// Beam width used at query time (raised to `k` when smaller).
    pub ef_search: usize,
    pub metric: Metric,
    /// Seed for level assignment, so rebuilding the same schema yields the same graph.
    pub seed: u64,
    /// How many chunk texts are sent to the embedder per request.
    pub embed_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 200,
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            metric: Metric::Cosine,
            seed: 42,
            embed_batch_size: 32,
        }
    }
}

impl IndexConfig {
    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            metric: self.metric,
            seed: self.seed,
        }
    }
}
