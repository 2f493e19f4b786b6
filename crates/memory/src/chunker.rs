//! Recursive character chunker.
//!
//! Text is first cut into pieces using the coarsest separator that works
//! (blank line, newline, sentence end, space, then raw characters), recursing
//! with finer separators into pieces that are still too long. Pieces are then
//! packed greedily into chunk bodies, and every chunk after the first is
//! prefixed with the last `chunk_overlap` characters that precede its body.
//!
//! All sizes and offsets are counted in `char`s, not bytes.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::ChunkError;

/// Separators tried in order, coarsest first. The empty separator means
/// "cut anywhere".
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// A bounded slice of a source document, ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    /// Character offset of `text` within its source.
    pub start_offset: usize,
    pub source_id: String,
    /// Position among the chunks of the same source, starting at 0.
    pub sequence_index: usize,
}

impl Chunk {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ChunkError> {
        if chunk_size == 0 {
            return Err(ChunkError::ZeroChunkSize);
        }
        if chunk_overlap >= chunk_size {
            return Err(ChunkError::InvalidOverlap {
                chunk_size,
                chunk_overlap,
            });
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| (*s).to_string()).collect(),
        })
    }

    /// Replace the separator priority list.
    ///
    /// Without a trailing empty separator, a piece that contains none of the
    /// separators is emitted whole even when it exceeds `chunk_size`.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).collect();
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split a batch of `(text, source_id)` documents.
    pub fn split<'a, I>(&self, documents: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        documents
            .into_iter()
            .flat_map(|(text, source_id)| self.split_text(text, source_id))
            .collect()
    }

    pub fn split_text(&self, text: &str, source_id: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let doc = CharText::new(text);
        let mut pieces = Vec::new();
        self.split_range(&doc, 0..doc.len(), &self.separators, &mut pieces);

        self.pack(&pieces)
            .into_iter()
            .enumerate()
            .map(|(sequence_index, body)| {
                let start = if sequence_index == 0 {
                    body.start
                } else {
                    body.start.saturating_sub(self.chunk_overlap)
                };
                Chunk {
                    text: doc.slice(start..body.end).to_string(),
                    start_offset: start,
                    source_id: source_id.to_string(),
                    sequence_index,
                }
            })
            .collect()
    }

    /// Fresh characters a chunk may carry once the overlap prefix is accounted for.
    fn body_budget(&self) -> usize {
        self.chunk_size - self.chunk_overlap
    }

    fn split_range(
        &self,
        doc: &CharText<'_>,
        range: Range<usize>,
        separators: &[String],
        out: &mut Vec<Range<usize>>,
    ) {
        let budget = self.body_budget();
        if range.len() <= budget {
            if !range.is_empty() {
                out.push(range);
            }
            return;
        }

        let haystack = doc.slice(range.clone());
        let Some(pos) = separators
            .iter()
            .position(|sep| sep.is_empty() || haystack.contains(sep.as_str()))
        else {
            // Indivisible with the configured separators: keep it whole.
            out.push(range);
            return;
        };

        let separator = &separators[pos];
        let finer = &separators[pos + 1..];

        if separator.is_empty() {
            let mut start = range.start;
            while start < range.end {
                let end = (start + budget).min(range.end);
                out.push(start..end);
                start = end;
            }
            return;
        }

        for piece in doc.split_inclusive(range, separator) {
            if piece.len() <= budget {
                out.push(piece);
            } else {
                self.split_range(doc, piece, finer, out);
            }
        }
    }

    /// Greedily merge contiguous pieces into chunk bodies. The first body may
    /// use the whole `chunk_size`; later ones leave room for the overlap prefix.
    fn pack(&self, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut bodies: Vec<Range<usize>> = Vec::new();
        let mut current: Option<Range<usize>> = None;

        for piece in pieces {
            current = match current {
                None => Some(piece.clone()),
                Some(body) => {
                    let capacity = if bodies.is_empty() {
                        self.chunk_size
                    } else {
                        self.body_budget()
                    };
                    if piece.end - body.start <= capacity {
                        Some(body.start..piece.end)
                    } else {
                        bodies.push(body);
                        Some(piece.clone())
                    }
                },
            };
        }
        bodies.extend(current);
        bodies
    }
}

/// A string addressed by character index.
struct CharText<'a> {
    text: &'a str,
    /// Byte offset of every char, plus `text.len()` as a sentinel.
    bounds: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let bounds = text
            .char_indices()
            .map(|(byte, _)| byte)
            .chain(std::iter::once(text.len()))
            .collect();
        Self { text, bounds }
    }

    fn len(&self) -> usize {
        self.bounds.len() - 1
    }

    fn slice(&self, range: Range<usize>) -> &'a str {
        &self.text[self.bounds[range.start]..self.bounds[range.end]]
    }

    fn char_index(&self, byte: usize) -> usize {
        self.bounds.partition_point(|&b| b < byte)
    }

    /// Split `range` on `separator`, keeping each separator at the end of the
    /// piece it terminates so the pieces still tile the range.
    fn split_inclusive(&self, range: Range<usize>, separator: &str) -> Vec<Range<usize>> {
        let base = self.bounds[range.start];
        let mut pieces = Vec::new();
        let mut start = range.start;
        for (idx, matched) in self.slice(range.clone()).match_indices(separator) {
            let end = self.char_index(base + idx + matched.len());
            if end > start {
                pieces.push(start..end);
                start = end;
            }
        }
        if start < range.end {
            pieces.push(start..range.end);
        }
        pieces
    }
}
