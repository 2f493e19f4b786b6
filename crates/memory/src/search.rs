use std::sync::Arc;

use tracing::debug;

use crate::{
    embeddings::EmbeddingProvider,
    index::{SearchHit, VectorIndex},
};

/// A loaded index paired with the embedder used to query it.
#[derive(Clone)]
pub struct SchemaMemory {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SchemaMemory {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// Embed `query` and return the `k` closest chunks, nearest first.
    pub async fn search(&self, query: &str, k: usize) -> anyhow::Result<Vec<SearchHit>> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&vector, k)?;
        debug!(k, hits = hits.len(), "schema search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use {
        super::*,
        crate::{chunker::Chunk, hnsw::HnswParams, index::EmbeddedRecord},
        async_trait::async_trait,
    };

    struct AxisEmbedder;

    #[async_trait]
    impl EmbeddingProvider for AxisEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(match text {
                t if t.contains("user") => vec![1.0, 0.0],
                _ => vec![0.0, 1.0],
            })
        }

        fn model_name(&self) -> &str {
            "axis"
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn memory() -> SchemaMemory {
        let records = [("type User", [1.0, 0.0]), ("type Order", [0.0, 1.0])]
            .into_iter()
            .enumerate()
            .map(|(i, (text, v))| EmbeddedRecord {
                vector: v.to_vec(),
                chunk: Chunk {
                    text: text.into(),
                    start_offset: 0,
                    source_id: format!("s{i}"),
                    sequence_index: 0,
                },
            });
        let index = VectorIndex::build(2, HnswParams::default(), records).unwrap();
        SchemaMemory::new(Arc::new(index), Arc::new(AxisEmbedder))
    }

    #[tokio::test]
    async fn query_is_embedded_and_matched() {
        let hits = memory().search("which user fields exist", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.text, "type User");
    }

    #[tokio::test]
    async fn zero_k_skips_embedding() {
        assert!(memory().search("user", 0).await.unwrap().is_empty());
    }
}
