//! Input tree supplied by format-specific document extractors.
//!
//! Per-format structure analysis (PDF layout and bookmarks, Markdown
//! headings, Word styles) lives entirely behind [`DocumentExtractor`]; this
//! crate only consumes the resulting tree.

use async_trait::async_trait;
use std::path::Path;

use crate::types::Result;

/// An atomic unit of extracted content: a page, paragraph, or block.
#[derive(Debug, Clone, Default)]
pub struct RawContentUnit {
    pub text: String,
    /// Opaque references (paths, URIs) to images extracted alongside the
    /// text. Carried through untouched; the core never interprets them.
    pub images: Vec<String>,
}

impl RawContentUnit {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }
}

/// One node of the extracted hierarchy, before summarization.
#[derive(Debug, Clone, Default)]
pub struct RawNode {
    pub title: String,
    /// Extractor-reported depth. Flattening recomputes depth from tree shape
    /// so a malformed extractor cannot break the level invariant.
    pub level: u32,
    pub content_units: Vec<RawContentUnit>,
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn new(title: impl Into<String>, level: u32) -> Self {
        Self {
            title: title.into(),
            level,
            content_units: Vec::new(),
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, units: Vec<RawContentUnit>) -> Self {
        self.content_units = units;
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<RawNode>) -> Self {
        self.children = children;
        self
    }

    /// Number of nodes in this subtree, itself included. Used for progress
    /// totals in the summarization pipeline.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(RawNode::node_count).sum::<usize>()
    }
}

/// Format-specific structure extraction, one implementation per supported
/// file format.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    /// File extensions this extractor handles (lowercase, without dots).
    fn supported_extensions(&self) -> &[&str];

    /// Extracts the hierarchical structure of `source`. Multiple disjoint
    /// top-level sections come back as multiple roots.
    async fn extract(&self, source: &Path) -> Result<Vec<RawNode>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_count_includes_all_descendants() {
        let tree = RawNode::new("root", 0).with_children(vec![
            RawNode::new("a", 1),
            RawNode::new("b", 1).with_children(vec![RawNode::new("b1", 2)]),
        ]);
        assert_eq!(tree.node_count(), 4);
    }
}
