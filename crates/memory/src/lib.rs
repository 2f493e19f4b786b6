//! Schema memory: GraphQL schema text → chunked → embedded → HNSW index on disk.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod embeddings_openai;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod manager;
pub mod search;
pub mod source;
pub mod store;

pub use {
    chunker::{Chunk, RecursiveChunker},
    config::IndexConfig,
    embeddings::EmbeddingProvider,
    error::{ChunkError, IndexError},
    hnsw::{HnswParams, Metric},
    index::{SearchHit, VectorIndex},
    manager::IndexManager,
    search::SchemaMemory,
    source::SchemaSource,
};
