//! Layered proximity graph.
//!
//! Every node lives on layer 0 and, with exponentially decaying probability,
//! on higher layers. Inserts and queries descend greedily from the entry point
//! on the top layer, then run a beam search on the lower layers. Neighbor
//! lists are chosen with the diversity heuristic: a candidate is dropped when
//! it is closer to an already selected neighbor than to the base node.
//!
//! Node ids are dense and assigned in insertion order.

use std::{
    cmp::Reverse,
    collections::{BinaryHeap, HashSet},
};

use {
    rand::{Rng, SeedableRng, rngs::StdRng},
    tracing::trace,
};

use super::{
    HnswParams, Metric,
    distance::{cosine_distance, euclidean_distance, magnitude},
    pqueue::Candidate,
};
use crate::error::IndexError;

/// Highest layer a node can be assigned to.
pub const MAX_LEVEL: usize = 16;

pub struct HnswGraph {
    params: HnswParams,
    dimension: usize,
    vectors: Vec<Vec<f32>>,
    norms: Vec<f32>,
    /// `links[node][layer]` holds the neighbor ids of `node` on `layer`;
    /// a node on level `l` has `l + 1` lists.
    links: Vec<Vec<Vec<u32>>>,
    entry_point: Option<u32>,
    max_level: usize,
    level_mult: f64,
    rng: StdRng,
}

impl HnswGraph {
    pub fn new(dimension: usize, params: HnswParams) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::EmptyVector);
        }
        Ok(Self {
            params,
            dimension,
            vectors: Vec::new(),
            norms: Vec::new(),
            links: Vec::new(),
            entry_point: None,
            max_level: 0,
            level_mult: level_mult(params.m),
            rng: StdRng::seed_from_u64(params.seed),
        })
    }

    /// Reassemble a graph from persisted parts, checking that the adjacency is
    /// consistent with the vectors before handing it out.
    pub(crate) fn from_parts(
        dimension: usize,
        params: HnswParams,
        vectors: Vec<Vec<f32>>,
        links: Vec<Vec<Vec<u32>>>,
        entry_point: Option<u32>,
        max_level: usize,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::corrupt("dimension is zero"));
        }
        if vectors.len() != links.len() {
            return Err(IndexError::corrupt(format!(
                "{} vectors but {} adjacency entries",
                vectors.len(),
                links.len()
            )));
        }
        let count = vectors.len();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(IndexError::corrupt(format!(
                "vector {bad} does not have {dimension} dimensions"
            )));
        }
        for (node, layers) in links.iter().enumerate() {
            if layers.is_empty() || layers.len() > max_level + 1 {
                return Err(IndexError::corrupt(format!(
                    "node {node} has {} layers (max level {max_level})",
                    layers.len()
                )));
            }
            for (layer, neighbors) in layers.iter().enumerate() {
                for &neighbor in neighbors {
                    let valid = links
                        .get(neighbor as usize)
                        .is_some_and(|n| n.len() > layer)
                        && neighbor as usize != node;
                    if !valid {
                        return Err(IndexError::corrupt(format!(
                            "node {node} links to invalid neighbor {neighbor} on layer {layer}"
                        )));
                    }
                }
            }
        }
        match entry_point {
            None if count == 0 => {},
            Some(entry) if (entry as usize) < count => {
                if links[entry as usize].len() != max_level + 1 {
                    return Err(IndexError::corrupt(
                        "entry point is not on the top layer",
                    ));
                }
            },
            _ => {
                return Err(IndexError::corrupt(format!(
                    "entry point {entry_point:?} does not match {count} nodes"
                )));
            },
        }

        let norms = vectors.iter().map(|v| magnitude(v)).collect();
        Ok(Self {
            params,
            dimension,
            vectors,
            norms,
            links,
            entry_point,
            max_level,
            level_mult: level_mult(params.m),
            // Only used if more nodes are inserted after a load.
            rng: StdRng::seed_from_u64(params.seed ^ count as u64),
        })
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub fn metric(&self) -> Metric {
        self.params.metric
    }

    pub fn entry_point(&self) -> Option<u32> {
        self.entry_point
    }

    pub fn max_level(&self) -> usize {
        self.max_level
    }

    pub fn vector(&self, id: u32) -> Option<&[f32]> {
        self.vectors.get(id as usize).map(Vec::as_slice)
    }

    /// Top layer of `id`, if the node exists.
    pub fn level(&self, id: u32) -> Option<usize> {
        self.links.get(id as usize).map(|layers| layers.len() - 1)
    }

    pub fn neighbors(&self, id: u32, layer: usize) -> &[u32] {
        self.links
            .get(id as usize)
            .and_then(|layers| layers.get(layer))
            .map_or(&[], Vec::as_slice)
    }

    /// Full adjacency, indexed by node then layer.
    pub fn adjacency(&self) -> &[Vec<Vec<u32>>] {
        &self.links
    }

    /// Links allowed per node on `layer`.
    pub fn max_links(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.is_empty() {
            return Err(IndexError::EmptyVector);
        }
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// Insert a vector and return its id. The graph is untouched on error.
    pub fn insert(&mut self, vector: Vec<f32>) -> Result<u32, IndexError> {
        self.check_dimension(&vector)?;

        let id = self.vectors.len() as u32;
        let level = self.random_level();
        self.norms.push(magnitude(&vector));
        self.vectors.push(vector);
        self.links.push(vec![Vec::new(); level + 1]);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return Ok(id);
        };

        let query = self.vectors[id as usize].clone();
        let query_norm = self.norms[id as usize];
        let mut nearest = Candidate {
            distance: self.distance_to(&query, query_norm, entry),
            id: entry,
        };

        for layer in (level + 1..=self.max_level).rev() {
            nearest = self.greedy_closest(&query, query_norm, nearest, layer);
        }

        let ef = self.params.ef_construction.max(1);
        for layer in (0..=level.min(self.max_level)).rev() {
            let found = self.search_layer(&query, query_norm, nearest, ef, layer);
            let selected = self.select_diverse(&found, self.params.m);

            for &neighbor in &selected {
                self.links[neighbor as usize][layer].push(id);
                self.shrink(neighbor, layer);
            }
            self.links[id as usize][layer] = selected;

            if let Some(closest) = found.first() {
                nearest = *closest;
            }
        }

        if level > self.max_level {
            trace!(id, level, "new entry point");
            self.entry_point = Some(id);
            self.max_level = level;
        }
        Ok(id)
    }

    /// The `k` nearest nodes to `query`, closest first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Candidate>, IndexError> {
        let Some(entry) = self.entry_point else {
            return Ok(Vec::new());
        };
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = magnitude(query);
        let mut nearest = Candidate {
            distance: self.distance_to(query, query_norm, entry),
            id: entry,
        };
        for layer in (1..=self.max_level).rev() {
            nearest = self.greedy_closest(query, query_norm, nearest, layer);
        }

        let ef = self.params.ef_search.max(k);
        let mut found = self.search_layer(query, query_norm, nearest, ef, 0);
        found.truncate(k);
        Ok(found)
    }

    fn random_level(&mut self) -> usize {
        // `random` is in [0, 1); flip it so ln never sees zero.
        let uniform = 1.0 - self.rng.random::<f64>();
        let level = (-uniform.ln() * self.level_mult).floor();
        (level as usize).min(MAX_LEVEL)
    }

    fn distance_to(&self, query: &[f32], query_norm: f32, id: u32) -> f32 {
        let node = &self.vectors[id as usize];
        match self.params.metric {
            Metric::Cosine => cosine_distance(node, query, self.norms[id as usize], query_norm),
            Metric::Euclidean => euclidean_distance(node, query),
        }
    }

    fn distance_between(&self, a: u32, b: u32) -> f32 {
        self.distance_to(&self.vectors[b as usize], self.norms[b as usize], a)
    }

    /// Walk to the closest node reachable on `layer` by always moving to a
    /// strictly closer neighbor.
    fn greedy_closest(
        &self,
        query: &[f32],
        query_norm: f32,
        start: Candidate,
        layer: usize,
    ) -> Candidate {
        let mut current = start;
        loop {
            let mut moved = false;
            for &neighbor in self.neighbors(current.id, layer) {
                let distance = self.distance_to(query, query_norm, neighbor);
                if distance < current.distance {
                    current = Candidate {
                        distance,
                        id: neighbor,
                    };
                    moved = true;
                }
            }
            if !moved {
                return current;
            }
        }
    }

    /// Beam search on one layer. Returns up to `ef` candidates, closest first.
    fn search_layer(
        &self,
        query: &[f32],
        query_norm: f32,
        entry: Candidate,
        ef: usize,
        layer: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = HashSet::from([entry.id]);
        let mut frontier = BinaryHeap::from([Reverse(entry)]);
        let mut best = BinaryHeap::from([entry]);

        while let Some(Reverse(current)) = frontier.pop() {
            if let Some(worst) = best.peek()
                && current.distance > worst.distance
                && best.len() >= ef
            {
                break;
            }

            for &neighbor in self.neighbors(current.id, layer) {
                if !visited.insert(neighbor) {
                    continue;
                }
                let distance = self.distance_to(query, query_norm, neighbor);
                let admit = best.len() < ef || best.peek().is_some_and(|w| distance < w.distance);
                if admit {
                    let candidate = Candidate {
                        distance,
                        id: neighbor,
                    };
                    frontier.push(Reverse(candidate));
                    best.push(candidate);
                    if best.len() > ef {
                        best.pop();
                    }
                }
            }
        }

        best.into_sorted_vec()
    }

    /// Pick up to `m` neighbors from `candidates` (sorted closest first),
    /// skipping any candidate that is closer to an already picked neighbor
    /// than to the base node.
    fn select_diverse(&self, candidates: &[Candidate], m: usize) -> Vec<u32> {
        let mut selected: Vec<u32> = Vec::with_capacity(m);
        for candidate in candidates {
            if selected.len() >= m {
                break;
            }
            let dominated = selected
                .iter()
                .any(|&chosen| self.distance_between(candidate.id, chosen) < candidate.distance);
            if !dominated {
                selected.push(candidate.id);
            }
        }
        selected
    }

    /// Re-select the neighbors of `node` on `layer` once the list is over budget.
    fn shrink(&mut self, node: u32, layer: usize) {
        let limit = self.max_links(layer);
        if self.neighbors(node, layer).len() <= limit {
            return;
        }
        let mut candidates: Vec<Candidate> = self
            .neighbors(node, layer)
            .iter()
            .map(|&neighbor| Candidate {
                distance: self.distance_between(node, neighbor),
                id: neighbor,
            })
            .collect();
        candidates.sort();
        let kept = self.select_diverse(&candidates, limit);
        self.links[node as usize][layer] = kept;
    }
}

fn level_mult(m: usize) -> f64 {
    1.0 / (m.max(2) as f64).ln()
}
