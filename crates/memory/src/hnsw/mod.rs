//! Hierarchical navigable small world graph for approximate nearest-neighbor search.

pub mod distance;
pub mod graph;
pub mod pqueue;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use {graph::HnswGraph, pqueue::Candidate};

/// Distance metric, fixed when the graph is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// `1 - cos(a, b)`; zero-magnitude vectors sit at distance 1 from everything.
    Cosine,
    /// Plain L2 distance.
    Euclidean,
}

impl Metric {
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => {
                distance::cosine_distance(a, b, distance::magnitude(a), distance::magnitude(b))
            },
            Self::Euclidean => distance::euclidean_distance(a, b),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Euclidean => "euclidean",
        })
    }
}

/// Graph construction and query parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Links per node on upper layers; layer 0 allows `2 * m`.
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: Metric,
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            metric: Metric::Cosine,
            seed: 42,
        }
    }
}
