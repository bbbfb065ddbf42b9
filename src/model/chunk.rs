//! Persisted chunk records: one per document section or content unit.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::types::{ChunkError, Result};

/// Discriminates section headers from atomic extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// A titled section that may have structural children. Carries a summary
    /// once the pipeline has computed one.
    Structural,
    /// An atomic piece of extracted text (a page, paragraph, or block).
    /// Always a leaf.
    ContentUnit,
}

impl ChunkKind {
    /// Stable string form used by storage engines.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Structural => "structural",
            ChunkKind::ContentUnit => "content_unit",
        }
    }

    /// Inverse of [`as_str`](Self::as_str).
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "structural" => Some(ChunkKind::Structural),
            "content_unit" => Some(ChunkKind::ContentUnit),
            _ => None,
        }
    }
}

/// One persisted node of a document's hierarchy.
///
/// Chunks are created once during indexing, never mutated afterwards, and
/// deleted only as a whole-collection drop. The tree shape is encoded through
/// `parent_key` alone; `level` and `index` make ordering and depth cheap to
/// query without walking the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique within the owning document's collection.
    pub key: String,
    /// Identifies the owning collection.
    pub doc_id: String,
    /// Empty only for document roots (level 0); otherwise references another
    /// chunk's `key` in the same collection.
    #[serde(default)]
    pub parent_key: String,
    /// Depth from the document root (root = 0).
    pub level: u32,
    /// Sibling order under the same parent. Reconstruction respects this
    /// order, never storage iteration order.
    pub index: u32,
    /// Section heading; empty for content units.
    #[serde(default)]
    pub title: String,
    /// Raw textual payload. Non-empty only for content units and small
    /// sections with no children.
    #[serde(default)]
    pub text: String,
    /// Condensed version of the subtree's content. Non-empty for structural
    /// chunks once summarization completes.
    #[serde(default)]
    pub summary: String,
    /// True iff structural children exist.
    pub has_child_node: bool,
    pub kind: ChunkKind,
}

impl Chunk {
    /// Creates a structural chunk with empty text/summary.
    pub fn structural(
        key: impl Into<String>,
        doc_id: impl Into<String>,
        parent_key: impl Into<String>,
        level: u32,
        index: u32,
        title: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            doc_id: doc_id.into(),
            parent_key: parent_key.into(),
            level,
            index,
            title: title.into(),
            text: String::new(),
            summary: String::new(),
            has_child_node: false,
            kind: ChunkKind::Structural,
        }
    }

    /// Creates a content-unit leaf chunk.
    pub fn content_unit(
        key: impl Into<String>,
        doc_id: impl Into<String>,
        parent_key: impl Into<String>,
        level: u32,
        index: u32,
        text: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            doc_id: doc_id.into(),
            parent_key: parent_key.into(),
            level,
            index,
            title: String::new(),
            text: text.into(),
            summary: String::new(),
            has_child_node: false,
            kind: ChunkKind::ContentUnit,
        }
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    #[must_use]
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    #[must_use]
    pub fn with_children(mut self, has_child_node: bool) -> Self {
        self.has_child_node = has_child_node;
        self
    }

    /// A document root: level 0 with no parent reference.
    pub fn is_root(&self) -> bool {
        self.parent_key.is_empty()
    }

    /// The text that feeds the chunk's text embedding, if meaningful for this
    /// chunk: content units always, structural chunks only when childless.
    pub fn embeddable_text(&self) -> Option<&str> {
        match self.kind {
            ChunkKind::ContentUnit => Some(&self.text),
            ChunkKind::Structural if !self.has_child_node && !self.text.is_empty() => {
                Some(&self.text)
            }
            ChunkKind::Structural => None,
        }
    }

    /// The text that feeds the chunk's summary embedding, if any.
    pub fn embeddable_summary(&self) -> Option<&str> {
        if self.summary.is_empty() {
            None
        } else {
            Some(&self.summary)
        }
    }
}

/// Checks the structural invariants of a complete per-document chunk set.
///
/// Intended for indexing flows and tests; point writes through the store are
/// not re-validated against the rest of the collection.
pub fn validate_chunks(chunks: &[Chunk]) -> Result<()> {
    let mut by_key: HashMap<&str, &Chunk> = HashMap::with_capacity(chunks.len());
    for chunk in chunks {
        if chunk.key.is_empty() {
            return Err(ChunkError::InvalidArgument("chunk with empty key".into()));
        }
        if by_key.insert(chunk.key.as_str(), chunk).is_some() {
            return Err(ChunkError::InvalidArgument(format!(
                "duplicate chunk key '{}'",
                chunk.key
            )));
        }
    }

    let mut sibling_indexes: HashMap<&str, HashSet<u32>> = HashMap::new();
    for chunk in chunks {
        if chunk.is_root() {
            if chunk.level != 0 {
                return Err(ChunkError::InvalidArgument(format!(
                    "root chunk '{}' has level {}",
                    chunk.key, chunk.level
                )));
            }
        } else {
            let parent = by_key.get(chunk.parent_key.as_str()).ok_or_else(|| {
                ChunkError::InvalidArgument(format!(
                    "chunk '{}' references missing parent '{}'",
                    chunk.key, chunk.parent_key
                ))
            })?;
            if parent.level + 1 != chunk.level {
                return Err(ChunkError::InvalidArgument(format!(
                    "chunk '{}' at level {} under parent at level {}",
                    chunk.key, chunk.level, parent.level
                )));
            }
            if parent.kind == ChunkKind::ContentUnit {
                return Err(ChunkError::InvalidArgument(format!(
                    "content unit '{}' has children",
                    parent.key
                )));
            }
        }
        let taken = sibling_indexes.entry(chunk.parent_key.as_str()).or_default();
        if !taken.insert(chunk.index) {
            return Err(ChunkError::InvalidArgument(format!(
                "duplicate sibling index {} under '{}'",
                chunk.index, chunk.parent_key
            )));
        }
    }

    // Dense sibling order: indexes 0..n under every parent.
    for (parent, taken) in &sibling_indexes {
        let n = taken.len() as u32;
        if taken.iter().any(|idx| *idx >= n) {
            return Err(ChunkError::InvalidArgument(format!(
                "sibling indexes under '{parent}' are not dense"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Chunk> {
        vec![
            Chunk::structural("0", "doc", "", 0, 0, "Root").with_children(true),
            Chunk::structural("0.0", "doc", "0", 1, 0, "Intro"),
            Chunk::content_unit("0.1", "doc", "0", 1, 1, "paragraph text"),
        ]
    }

    #[test]
    fn valid_collection_passes() {
        validate_chunks(&sample()).unwrap();
    }

    #[test]
    fn duplicate_keys_rejected() {
        let mut chunks = sample();
        chunks.push(Chunk::structural("0.0", "doc", "0", 1, 2, "Dup"));
        assert!(matches!(
            validate_chunks(&chunks),
            Err(ChunkError::InvalidArgument(_))
        ));
    }

    #[test]
    fn missing_parent_rejected() {
        let mut chunks = sample();
        chunks.push(Chunk::structural("9.9", "doc", "9", 1, 0, "Orphan"));
        assert!(validate_chunks(&chunks).is_err());
    }

    #[test]
    fn level_must_increment() {
        let mut chunks = sample();
        chunks.push(Chunk::structural("0.2", "doc", "0", 3, 2, "Skipped"));
        assert!(validate_chunks(&chunks).is_err());
    }

    #[test]
    fn sparse_sibling_indexes_rejected() {
        let chunks = vec![
            Chunk::structural("0", "doc", "", 0, 0, "Root").with_children(true),
            Chunk::structural("0.0", "doc", "0", 1, 0, "A"),
            Chunk::structural("0.2", "doc", "0", 1, 2, "C"),
        ];
        assert!(validate_chunks(&chunks).is_err());
    }

    #[test]
    fn embeddable_text_rules() {
        let unit = Chunk::content_unit("k", "doc", "p", 1, 0, "body");
        assert_eq!(unit.embeddable_text(), Some("body"));

        let parent = Chunk::structural("p", "doc", "", 0, 0, "Top").with_children(true);
        assert_eq!(parent.embeddable_text(), None);

        let leaf_section = Chunk::structural("s", "doc", "", 0, 0, "Small").with_text("inline");
        assert_eq!(leaf_section.embeddable_text(), Some("inline"));
    }

    #[test]
    fn kind_round_trips_as_str() {
        for kind in [ChunkKind::Structural, ChunkKind::ContentUnit] {
            assert_eq!(ChunkKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ChunkKind::parse("bogus"), None);
    }
}
