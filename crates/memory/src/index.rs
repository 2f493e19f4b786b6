//! Vector index over schema chunks: an [`HnswGraph`] plus the chunk each node
//! was embedded from.

use std::{collections::BTreeMap, path::Path};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::{
    chunker::Chunk,
    error::IndexError,
    hnsw::{HnswGraph, HnswParams, Metric},
    store,
};

/// Where the indexed chunks came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Model that produced the stored vectors, when known.
    pub embedding_model: Option<String>,
    /// Content hash per source id at build time.
    pub source_hashes: BTreeMap<String, String>,
}

/// A record about to be inserted.
#[derive(Debug, Clone)]
pub struct EmbeddedRecord {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: u32,
    pub chunk: Chunk,
    pub distance: f32,
}

pub struct VectorIndex {
    graph: HnswGraph,
    chunks: Vec<Chunk>,
    provenance: Provenance,
}

impl VectorIndex {
    pub fn new(dimension: usize, params: HnswParams) -> Result<Self, IndexError> {
        Ok(Self {
            graph: HnswGraph::new(dimension, params)?,
            chunks: Vec::new(),
            provenance: Provenance::default(),
        })
    }

    /// Build an index from already embedded records, inserting them in order.
    pub fn build<I>(dimension: usize, params: HnswParams, records: I) -> Result<Self, IndexError>
    where
        I: IntoIterator<Item = EmbeddedRecord>,
    {
        let mut index = Self::new(dimension, params)?;
        for record in records {
            index.insert(record.vector, record.chunk)?;
        }
        info!(
            records = index.len(),
            dimension,
            metric = %params.metric,
            max_level = index.graph.max_level(),
            "built vector index"
        );
        Ok(index)
    }

    pub(crate) fn from_parts(
        graph: HnswGraph,
        chunks: Vec<Chunk>,
        provenance: Provenance,
    ) -> Result<Self, IndexError> {
        if graph.len() != chunks.len() {
            return Err(IndexError::corrupt(format!(
                "{} vectors but {} stored chunks",
                graph.len(),
                chunks.len()
            )));
        }
        Ok(Self {
            graph,
            chunks,
            provenance,
        })
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Insert one record and return its id. Nothing is stored on error.
    pub fn insert(&mut self, vector: Vec<f32>, chunk: Chunk) -> Result<u32, IndexError> {
        let id = self.graph.insert(vector)?;
        self.chunks.push(chunk);
        Ok(id)
    }

    /// The `k` closest records to `query`, nearest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        let candidates = self.graph.search(query, k)?;
        debug!(k, hits = candidates.len(), "vector search");
        Ok(candidates
            .into_iter()
            .filter_map(|c| {
                self.chunks.get(c.id as usize).map(|chunk| SearchHit {
                    id: c.id,
                    chunk: chunk.clone(),
                    distance: c.distance,
                })
            })
            .collect())
    }

    pub fn record(&self, id: u32) -> Option<&Chunk> {
        self.chunks.get(id as usize)
    }

    pub fn records(&self) -> impl Iterator<Item = (u32, &Chunk)> {
        self.chunks.iter().enumerate().map(|(id, c)| (id as u32, c))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.graph.dimension()
    }

    pub fn metric(&self) -> Metric {
        self.graph.metric()
    }

    pub fn params(&self) -> &HnswParams {
        self.graph.params()
    }

    pub fn graph(&self) -> &HnswGraph {
        &self.graph
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Persist to `dir`, creating it if needed. Existing index files are replaced.
    pub fn save(&self, dir: &Path) -> Result<(), IndexError> {
        store::save(self, dir)
    }

    /// Load an index written by [`VectorIndex::save`].
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        store::load(dir)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn chunk(text: &str, seq: usize) -> Chunk {
        Chunk {
            text: text.into(),
            start_offset: seq * 10,
            source_id: "schema.graphql".into(),
            sequence_index: seq,
        }
    }

    fn records() -> Vec<EmbeddedRecord> {
        [
            ("type User", [1.0, 0.0, 0.0]),
            ("type Order", [0.0, 1.0, 0.0]),
            ("type Query", [0.0, 0.0, 1.0]),
            ("type Account", [0.9, 0.1, 0.0]),
        ]
        .into_iter()
        .enumerate()
        .map(|(seq, (text, v))| EmbeddedRecord {
            vector: v.to_vec(),
            chunk: chunk(text, seq),
        })
        .collect()
    }

    #[test]
    fn search_returns_chunks_nearest_first() {
        let index = VectorIndex::build(3, HnswParams::default(), records()).unwrap();
        assert_eq!(index.len(), 4);

        let hits = index.search(&[1.0, 0.05, 0.0], 2).unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, ["type User", "type Account"]);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn ids_follow_insertion_order() {
        let index = VectorIndex::build(3, HnswParams::default(), records()).unwrap();
        let ids: Vec<u32> = index.records().map(|(id, _)| id).collect();
        assert_eq!(ids, [0, 1, 2, 3]);
        assert_eq!(index.record(2).unwrap().text, "type Query");
        assert!(index.record(4).is_none());
    }

    #[test]
    fn empty_index_search_is_empty() {
        let index = VectorIndex::new(3, HnswParams::default()).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn failed_insert_stores_nothing() {
        let mut index = VectorIndex::build(3, HnswParams::default(), records()).unwrap();
        let err = index.insert(vec![1.0, 2.0], chunk("bad", 9)).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch {
            expected: 3,
            got: 2
        }));
        assert_eq!(index.len(), 4);
        assert_eq!(index.graph().len(), 4);
    }
}
