/// Index manager: schema sources → chunks → embeddings → persisted vector index.
use std::{path::Path, sync::Arc};

use {
    anyhow::Context,
    tracing::{debug, info, warn},
};

use crate::{
    chunker::{Chunk, RecursiveChunker},
    config::IndexConfig,
    embeddings::EmbeddingProvider,
    error::IndexError,
    index::{EmbeddedRecord, Provenance, VectorIndex},
    source::SchemaSource,
};

pub struct IndexManager {
    config: IndexConfig,
    embedder: Arc<dyn EmbeddingProvider>,
}

/// Summary of a build, for the CLI to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub sources: usize,
    pub chunks: usize,
    pub dimension: usize,
}

impl IndexManager {
    pub fn new(config: IndexConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, embedder }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Chunk and embed every source into a fresh in-memory index.
    pub async fn build(&self, sources: &[SchemaSource]) -> anyhow::Result<VectorIndex> {
        let chunker = RecursiveChunker::new(self.config.chunk_size, self.config.chunk_overlap)?;
        let chunks =
            chunker.split(sources.iter().map(|s| (s.text.as_str(), s.source_id.as_str())));
        info!(
            sources = sources.len(),
            chunks = chunks.len(),
            chunk_size = self.config.chunk_size,
            chunk_overlap = self.config.chunk_overlap,
            "chunked schema"
        );

        let vectors = self.embed_chunks(&chunks).await?;
        let dimension = self.embedder.dimensions();
        let records = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| EmbeddedRecord { vector, chunk });

        let provenance = Provenance {
            embedding_model: Some(self.embedder.model_name().to_string()),
            source_hashes: sources
                .iter()
                .map(|s| (s.source_id.clone(), s.hash.clone()))
                .collect(),
        };
        let index = VectorIndex::build(dimension, self.config.hnsw_params(), records)?
            .with_provenance(provenance);
        Ok(index)
    }

    /// Build from `sources` and save to `dir`.
    pub async fn build_and_save(
        &self,
        sources: &[SchemaSource],
        dir: &Path,
    ) -> anyhow::Result<BuildReport> {
        let index = self.build(sources).await?;
        index
            .save(dir)
            .with_context(|| format!("failed to save index to {}", dir.display()))?;
        Ok(BuildReport {
            sources: sources.len(),
            chunks: index.len(),
            dimension: index.dimension(),
        })
    }

    /// Load a saved index and check that it can be queried with the
    /// configured metric and embedder.
    pub fn load(&self, dir: &Path) -> Result<VectorIndex, IndexError> {
        let index = VectorIndex::load(dir)?;

        if index.metric() != self.config.metric {
            return Err(IndexError::MetricMismatch {
                stored: index.metric(),
                configured: self.config.metric,
            });
        }
        if index.dimension() != self.embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension(),
                got: self.embedder.dimensions(),
            });
        }
        if let Some(model) = &index.provenance().embedding_model
            && model != self.embedder.model_name()
        {
            warn!(
                stored = %model,
                configured = %self.embedder.model_name(),
                "index was built with a different embedding model"
            );
        }
        info!(dir = %dir.display(), records = index.len(), "loaded schema index");
        Ok(index)
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> anyhow::Result<Vec<Vec<f32>>> {
        let expected = self.embedder.dimensions();
        let batch_size = self.config.embed_batch_size.max(1);
        let mut vectors = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .embedder
                .embed_batch(&texts)
                .await
                .with_context(|| format!("failed to embed chunk batch {batch_no}"))?;
            if embedded.len() != texts.len() {
                anyhow::bail!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                );
            }
            for vector in &embedded {
                if vector.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    }
                    .into());
                }
            }
            debug!(batch = batch_no, size = texts.len(), "embedded chunk batch");
            vectors.extend(embedded);
        }
        Ok(vectors)
    }
}

/// Source ids whose content no longer matches what the index was built from.
/// Sources the index has never seen count as stale.
pub fn stale_sources(index: &VectorIndex, sources: &[SchemaSource]) -> Vec<String> {
    let hashes = &index.provenance().source_hashes;
    sources
        .iter()
        .filter(|s| hashes.get(&s.source_id) != Some(&s.hash))
        .map(|s| s.source_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};

    use {
        super::*,
        crate::hnsw::Metric,
        async_trait::async_trait,
        tempfile::TempDir,
    };

    /// Deterministic embedder: one dimension per keyword, 1.0 when the text
    /// mentions it. Enough for vector search to tell schema types apart.
    struct MockEmbedder {
        batches: AtomicUsize,
    }

    const KEYWORDS: [&str; 8] = [
        "user", "order", "product", "payment", "query", "mutation", "address", "review",
    ];

    fn keyword_embedding(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        KEYWORDS
            .iter()
            .map(|kw| if lower.contains(kw) { 1.0 } else { 0.0 })
            .collect()
    }

    impl MockEmbedder {
        fn new() -> Self {
            Self {
                batches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(keyword_embedding(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| keyword_embedding(t)).collect())
        }

        fn model_name(&self) -> &str {
            "mock-model"
        }

        fn dimensions(&self) -> usize {
            KEYWORDS.len()
        }
    }

    struct WrongSizeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for WrongSizeEmbedder {
        async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, 2.0])
        }

        fn model_name(&self) -> &str {
            "wrong"
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    const SCHEMA: &str = "type User {\n  id: ID!\n  name: String\n}\n\n\
        type Order {\n  id: ID!\n  total: Float\n}\n\n\
        type Product {\n  sku: String!\n  price: Float\n}\n\n\
        type Review {\n  rating: Int\n  body: String\n}\n";

    fn config() -> IndexConfig {
        IndexConfig {
            chunk_size: 48,
            chunk_overlap: 8,
            embed_batch_size: 2,
            ..IndexConfig::default()
        }
    }

    #[tokio::test]
    async fn build_search_and_reload() {
        let tmp = TempDir::new().unwrap();
        let embedder = Arc::new(MockEmbedder::new());
        let manager = IndexManager::new(config(), embedder.clone());
        let sources = [SchemaSource::new("schema.graphql", SCHEMA)];

        let report = manager
            .build_and_save(&sources, tmp.path())
            .await
            .unwrap();
        assert_eq!(report.sources, 1);
        assert!(report.chunks >= 4, "{report:?}");
        assert_eq!(report.dimension, 8);
        assert_eq!(
            embedder.batches.load(Ordering::SeqCst),
            report.chunks.div_ceil(2)
        );

        let index = manager.load(tmp.path()).unwrap();
        assert_eq!(index.len(), report.chunks);
        assert_eq!(
            index.provenance().embedding_model.as_deref(),
            Some("mock-model")
        );

        let hits = index.search(&keyword_embedding("product"), 1).unwrap();
        assert!(hits[0].chunk.text.contains("Product"), "{:?}", hits[0]);
    }

    #[tokio::test]
    async fn empty_schema_builds_empty_index() {
        let manager = IndexManager::new(config(), Arc::new(MockEmbedder::new()));
        let index = manager
            .build(&[SchemaSource::new("empty.graphql", "  \n")])
            .await
            .unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), 8);
    }

    #[tokio::test]
    async fn invalid_chunk_settings_fail_before_embedding() {
        let embedder = Arc::new(MockEmbedder::new());
        let manager = IndexManager::new(
            IndexConfig {
                chunk_size: 10,
                chunk_overlap: 10,
                ..IndexConfig::default()
            },
            embedder.clone(),
        );
        assert!(manager.build(&[SchemaSource::new("s", SCHEMA)]).await.is_err());
        assert_eq!(embedder.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embedder_dimension_drift_is_rejected() {
        let manager = IndexManager::new(config(), Arc::new(WrongSizeEmbedder));
        let err = manager
            .build(&[SchemaSource::new("s", SCHEMA)])
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[tokio::test]
    async fn load_rejects_other_metric() {
        let tmp = TempDir::new().unwrap();
        let builder = IndexManager::new(config(), Arc::new(MockEmbedder::new()));
        builder
            .build_and_save(&[SchemaSource::new("s", SCHEMA)], tmp.path())
            .await
            .unwrap();

        let loader = IndexManager::new(
            IndexConfig {
                metric: Metric::Euclidean,
                ..config()
            },
            Arc::new(MockEmbedder::new()),
        );
        assert!(matches!(
            loader.load(tmp.path()),
            Err(IndexError::MetricMismatch {
                stored: Metric::Cosine,
                configured: Metric::Euclidean
            })
        ));
    }

    #[tokio::test]
    async fn load_rejects_embedder_of_other_dimension() {
        let tmp = TempDir::new().unwrap();
        IndexManager::new(config(), Arc::new(MockEmbedder::new()))
            .build_and_save(&[SchemaSource::new("s", SCHEMA)], tmp.path())
            .await
            .unwrap();

        let loader = IndexManager::new(config(), Arc::new(WrongSizeEmbedder));
        assert!(matches!(
            loader.load(tmp.path()),
            Err(IndexError::DimensionMismatch {
                expected: 8,
                got: 3
            })
        ));
    }

    #[tokio::test]
    async fn stale_sources_follow_content_hash() {
        let manager = IndexManager::new(config(), Arc::new(MockEmbedder::new()));
        let original = SchemaSource::new("schema.graphql", SCHEMA);
        let index = manager.build(std::slice::from_ref(&original)).await.unwrap();

        assert!(stale_sources(&index, &[original]).is_empty());

        let edited = SchemaSource::new("schema.graphql", format!("{SCHEMA}\nscalar Date\n"));
        let extra = SchemaSource::new("extra.graphql", "type Address { city: String }");
        assert_eq!(stale_sources(&index, &[edited, extra]), [
            "schema.graphql",
            "extra.graphql"
        ]);
    }
}
