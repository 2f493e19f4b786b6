//! On-disk layout of a saved [`VectorIndex`].
//!
//! A saved index is a directory with three files:
//!
//! - `args.json`: format version, graph parameters and provenance
//! - `hnsw.index`: little-endian binary dump of vectors and adjacency
//! - `docstore.json`: the chunk stored under each node id
//!
//! `args.json` is written last, so a directory without it never loads.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::{
    chunker::Chunk,
    error::IndexError,
    hnsw::{HnswGraph, HnswParams, Metric, graph::MAX_LEVEL},
    index::{Provenance, VectorIndex},
};

pub const FORMAT_VERSION: u32 = 1;
pub const META_FILE: &str = "args.json";
pub const GRAPH_FILE: &str = "hnsw.index";
pub const DOCSTORE_FILE: &str = "docstore.json";

const MAGIC: &[u8; 4] = b"GQLH";
const NO_ENTRY: u32 = u32::MAX;

/// Contents of `args.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub format_version: u32,
    pub dimension: usize,
    pub metric: Metric,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub seed: u64,
    pub record_count: usize,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub source_hashes: BTreeMap<String, String>,
}

impl IndexMeta {
    pub fn params(&self) -> HnswParams {
        HnswParams {
            m: self.m,
            ef_construction: self.ef_construction,
            ef_search: self.ef_search,
            metric: self.metric,
            seed: self.seed,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct DocstoreEntry {
    id: u32,
    #[serde(flatten)]
    chunk: Chunk,
}

pub(crate) fn save(index: &VectorIndex, dir: &Path) -> Result<(), IndexError> {
    fs::create_dir_all(dir)?;

    let params = index.params();
    let provenance = index.provenance();
    let meta = IndexMeta {
        format_version: FORMAT_VERSION,
        dimension: index.dimension(),
        metric: params.metric,
        m: params.m,
        ef_construction: params.ef_construction,
        ef_search: params.ef_search,
        seed: params.seed,
        record_count: index.len(),
        embedding_model: provenance.embedding_model.clone(),
        source_hashes: provenance.source_hashes.clone(),
    };

    let docstore: Vec<DocstoreEntry> = index
        .records()
        .map(|(id, chunk)| DocstoreEntry {
            id,
            chunk: chunk.clone(),
        })
        .collect();

    write_atomic(&dir.join(GRAPH_FILE), &encode_graph(index.graph()))?;
    write_atomic(
        &dir.join(DOCSTORE_FILE),
        &serde_json::to_vec_pretty(&docstore)?,
    )?;
    write_atomic(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;

    info!(dir = %dir.display(), records = index.len(), "saved vector index");
    Ok(())
}

/// Read only `args.json`.
pub fn read_meta(dir: &Path) -> Result<IndexMeta, IndexError> {
    let raw = fs::read(dir.join(META_FILE))?;
    let meta: IndexMeta = serde_json::from_slice(&raw)
        .map_err(|e| IndexError::corrupt(format!("{META_FILE}: {e}")))?;
    if meta.format_version != FORMAT_VERSION {
        return Err(IndexError::corrupt(format!(
            "unsupported format version {} (expected {FORMAT_VERSION})",
            meta.format_version
        )));
    }
    Ok(meta)
}

pub(crate) fn load(dir: &Path) -> Result<VectorIndex, IndexError> {
    let meta = read_meta(dir)?;
    let graph = decode_graph(&fs::read(dir.join(GRAPH_FILE))?, &meta)?;

    let docstore: Vec<DocstoreEntry> =
        serde_json::from_slice(&fs::read(dir.join(DOCSTORE_FILE))?)
            .map_err(|e| IndexError::corrupt(format!("{DOCSTORE_FILE}: {e}")))?;
    if docstore.len() != meta.record_count {
        return Err(IndexError::corrupt(format!(
            "docstore has {} records, expected {}",
            docstore.len(),
            meta.record_count
        )));
    }
    let mut chunks = Vec::with_capacity(docstore.len());
    for (expected, entry) in docstore.into_iter().enumerate() {
        if entry.id as usize != expected {
            return Err(IndexError::corrupt(format!(
                "docstore record {expected} has id {}",
                entry.id
            )));
        }
        chunks.push(entry.chunk);
    }

    let provenance = Provenance {
        embedding_model: meta.embedding_model,
        source_hashes: meta.source_hashes,
    };
    let index = VectorIndex::from_parts(graph, chunks, provenance)?;
    debug!(dir = %dir.display(), records = index.len(), "loaded vector index");
    Ok(index)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), IndexError> {
    let mut tmp = PathBuf::from(path);
    tmp.as_mut_os_string().push(".tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn encode_graph(graph: &HnswGraph) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&(graph.dimension() as u32).to_le_bytes());
    buf.extend_from_slice(&(graph.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(graph.max_level() as u32).to_le_bytes());
    buf.extend_from_slice(&graph.entry_point().unwrap_or(NO_ENTRY).to_le_bytes());

    for (id, layers) in graph.adjacency().iter().enumerate() {
        buf.push((layers.len() - 1) as u8);
        for value in graph.vector(id as u32).unwrap_or_default() {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        for neighbors in layers {
            buf.extend_from_slice(&(neighbors.len() as u32).to_le_bytes());
            for neighbor in neighbors {
                buf.extend_from_slice(&neighbor.to_le_bytes());
            }
        }
    }
    buf
}

fn decode_graph(bytes: &[u8], meta: &IndexMeta) -> Result<HnswGraph, IndexError> {
    let mut reader = ByteReader::new(bytes);

    if reader.take(4)? != MAGIC {
        return Err(IndexError::corrupt("bad magic number in graph file"));
    }
    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(IndexError::corrupt(format!(
            "graph file version {version}, expected {FORMAT_VERSION}"
        )));
    }
    let dimension = reader.u32()? as usize;
    let count = reader.u32()? as usize;
    let max_level = reader.u32()? as usize;
    let entry = reader.u32()?;

    if dimension != meta.dimension {
        return Err(IndexError::corrupt(format!(
            "graph dimension {dimension} disagrees with metadata {}",
            meta.dimension
        )));
    }
    if count != meta.record_count {
        return Err(IndexError::corrupt(format!(
            "graph holds {count} nodes, metadata says {}",
            meta.record_count
        )));
    }
    if max_level > MAX_LEVEL {
        return Err(IndexError::corrupt(format!("max level {max_level} out of range")));
    }

    let mut vectors = Vec::with_capacity(count);
    let mut links = Vec::with_capacity(count);
    for _ in 0..count {
        let level = reader.u8()? as usize;
        if level > max_level {
            return Err(IndexError::corrupt(format!(
                "node level {level} above max level {max_level}"
            )));
        }
        let mut vector = Vec::with_capacity(dimension);
        for _ in 0..dimension {
            vector.push(reader.f32()?);
        }
        let mut layers = Vec::with_capacity(level + 1);
        for _ in 0..=level {
            let len = reader.u32()? as usize;
            if len > count {
                return Err(IndexError::corrupt(format!("neighbor list of length {len}")));
            }
            let mut neighbors = Vec::with_capacity(len);
            for _ in 0..len {
                neighbors.push(reader.u32()?);
            }
            layers.push(neighbors);
        }
        vectors.push(vector);
        links.push(layers);
    }
    if !reader.is_done() {
        return Err(IndexError::corrupt("trailing bytes after graph data"));
    }

    let entry_point = (entry != NO_ENTRY).then_some(entry);
    HnswGraph::from_parts(
        dimension,
        meta.params(),
        vectors,
        links,
        entry_point,
        max_level,
    )
}

/// Cursor over a byte slice where running out of input means corruption.
struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], IndexError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| IndexError::corrupt("graph file is truncated"))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], IndexError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, IndexError> {
        Ok(self.array::<1>()?[0])
    }

    fn u32(&mut self) -> Result<u32, IndexError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32, IndexError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    fn is_done(&self) -> bool {
        self.pos == self.bytes.len()
    }
}
