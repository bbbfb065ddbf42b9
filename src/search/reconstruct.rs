//! Rebuilds readable subtrees around flat search hits.
//!
//! Search returns isolated chunks; [`TreeAssembler`] walks their ancestry
//! back up to document roots and pulls siblings or whole subtrees back in,
//! so a caller can hand an LLM (or a human) coherent context instead of
//! disconnected paragraphs.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use crate::model::chunk::{Chunk, ChunkKind};
use crate::model::node::ChunkTree;
use crate::store::{ChunkFilter, ChunkStore};
use crate::types::Result;

/// Effectively unbounded fetch for filter scans where the result set is
/// already bounded by the document itself.
const NO_LIMIT: usize = usize::MAX;

pub struct TreeAssembler {
    store: Arc<ChunkStore>,
}

impl TreeAssembler {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }

    /// Builds the minimal tree containing every hit plus its ancestor chain.
    ///
    /// Hits sharing ancestors converge onto the same nodes, so overlapping
    /// matches cost one upward walk each but no duplicate structure. Hits
    /// whose ancestry cannot be resolved (dangling parent keys) are kept as
    /// tree-local roots rather than dropped.
    pub async fn assemble(&self, doc_id: &str, hits: &[Chunk]) -> Result<ChunkTree> {
        let mut tree = ChunkTree::new();
        for hit in hits {
            tree.insert(hit.clone());
            self.attach_ancestry(doc_id, &mut tree, hit).await?;
        }
        tree.finalize();
        Ok(tree)
    }

    /// Walks `chunk`'s parent chain upward, inserting and linking each
    /// ancestor until a root or an already-present node is reached.
    async fn attach_ancestry(
        &self,
        doc_id: &str,
        tree: &mut ChunkTree,
        chunk: &Chunk,
    ) -> Result<()> {
        let mut current = chunk.clone();
        while !current.is_root() {
            let parent_key = current.parent_key.clone();
            if tree.contains(&parent_key) {
                tree.attach(&parent_key, &current.key);
                return Ok(());
            }
            let Some(parent) = self.store.get_by_key(doc_id, &parent_key).await? else {
                tracing::warn!(doc_id, key = %current.key, parent_key, "dangling parent reference");
                return Ok(());
            };
            tree.insert(parent.clone());
            tree.attach(&parent_key, &current.key);
            current = parent;
        }
        Ok(())
    }

    /// The document's structural skeleton: every structural chunk, no
    /// content units. Useful as a table of contents.
    pub async fn outline(&self, doc_id: &str) -> Result<ChunkTree> {
        let sections = self
            .store
            .get_by_filter(
                doc_id,
                &ChunkFilter::any().kind(ChunkKind::Structural),
                NO_LIMIT,
            )
            .await?;
        let mut tree = ChunkTree::new();
        for chunk in &sections {
            tree.insert(chunk.clone());
        }
        for chunk in &sections {
            if !chunk.is_root() {
                tree.attach(&chunk.parent_key, &chunk.key);
            }
        }
        tree.finalize();
        Ok(tree)
    }

    /// Subtree of the first section (in document order) whose title contains
    /// `title_fragment`, content units included. `None` when no title
    /// matches; never an error.
    pub async fn section(&self, doc_id: &str, title_fragment: &str) -> Result<Option<ChunkTree>> {
        let mut sections = self
            .store
            .get_by_filter(
                doc_id,
                &ChunkFilter::any().kind(ChunkKind::Structural),
                NO_LIMIT,
            )
            .await?;
        sections.sort_by(|a, b| {
            (a.level, a.index, a.key.as_str()).cmp(&(b.level, b.index, b.key.as_str()))
        });
        let Some(root) = sections
            .into_iter()
            .find(|chunk| chunk.title.contains(title_fragment))
        else {
            return Ok(None);
        };
        let root_key = root.key.clone();
        let mut tree = ChunkTree::new();
        tree.insert(root);
        self.populate_descendants(doc_id, &mut tree, &root_key).await?;
        tree.finalize();
        Ok(Some(tree))
    }

    /// The entire document as one tree.
    pub async fn document(&self, doc_id: &str) -> Result<ChunkTree> {
        let chunks = self
            .store
            .get_by_filter(doc_id, &ChunkFilter::any(), NO_LIMIT)
            .await?;
        let mut tree = ChunkTree::new();
        for chunk in &chunks {
            tree.insert(chunk.clone());
        }
        for chunk in &chunks {
            if !chunk.is_root() {
                tree.attach(&chunk.parent_key, &chunk.key);
            }
        }
        tree.finalize();
        Ok(tree)
    }

    /// Breadth-first download of everything under `root_key`, one filter
    /// query per structural node.
    async fn populate_descendants(
        &self,
        doc_id: &str,
        tree: &mut ChunkTree,
        root_key: &str,
    ) -> Result<()> {
        let mut queue: VecDeque<String> = VecDeque::from([root_key.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(key) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            let children = self
                .store
                .get_by_filter(doc_id, &ChunkFilter::any().parent_key(key.clone()), NO_LIMIT)
                .await?;
            for child in children {
                let child_key = child.key.clone();
                let is_branch = child.has_child_node;
                tree.insert(child);
                tree.attach(&key, &child_key);
                if is_branch {
                    queue.push_back(child_key);
                }
            }
        }
        Ok(())
    }
}

/// Renders a tree as an indented outline, summaries and text inline. Handy
/// for prompt construction and for eyeballing reconstruction in tests.
pub fn render_tree(tree: &ChunkTree) -> String {
    let mut out = String::new();
    for root in tree.roots() {
        render_node(tree, &root.chunk.key, 0, &mut out);
    }
    out
}

fn render_node(tree: &ChunkTree, key: &str, depth: usize, out: &mut String) {
    let Some(node) = tree.get(key) else {
        return;
    };
    let pad = "  ".repeat(depth);
    match node.chunk.kind {
        ChunkKind::Structural => {
            out.push_str(&pad);
            out.push_str(&node.chunk.title);
            out.push('\n');
            let body = if !node.chunk.summary.is_empty() {
                &node.chunk.summary
            } else {
                &node.chunk.text
            };
            if !body.is_empty() {
                out.push_str(&pad);
                out.push_str(body);
                out.push('\n');
            }
        }
        ChunkKind::ContentUnit => {
            out.push_str(&pad);
            out.push_str(&node.chunk.text);
            out.push('\n');
        }
    }
    for child in &node.children {
        render_node(tree, child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::store::MemoryVectorEngine;

    fn fixture() -> Vec<Chunk> {
        vec![
            Chunk::structural("0", "doc", "", 0, 0, "Report").with_children(true),
            Chunk::structural("0.0", "doc", "0", 1, 0, "Background").with_children(true),
            Chunk::content_unit("0.0.0", "doc", "0.0", 2, 0, "history paragraph"),
            Chunk::content_unit("0.0.1", "doc", "0.0", 2, 1, "context paragraph"),
            Chunk::structural("0.1", "doc", "0", 1, 1, "Findings").with_children(true),
            Chunk::content_unit("0.1.0", "doc", "0.1", 2, 0, "result paragraph"),
        ]
    }

    async fn assembler_with_fixture() -> TreeAssembler {
        let store = Arc::new(ChunkStore::new(
            Arc::new(MemoryVectorEngine::new()),
            Arc::new(MockEmbeddingProvider::new()),
        ));
        store.add_document("doc", fixture()).await.unwrap();
        TreeAssembler::new(store)
    }

    #[tokio::test]
    async fn assemble_pulls_in_ancestor_chain() {
        let assembler = assembler_with_fixture().await;
        let hit = fixture().into_iter().find(|c| c.key == "0.0.1").unwrap();
        let tree = assembler.assemble("doc", &[hit]).await.unwrap();

        assert_eq!(tree.len(), 3);
        assert!(tree.contains("0"));
        assert!(tree.contains("0.0"));
        assert_eq!(tree.root_of("0.0.1").unwrap().chunk.key, "0");
    }

    #[tokio::test]
    async fn assemble_shares_common_ancestors() {
        let assembler = assembler_with_fixture().await;
        let hits: Vec<Chunk> = fixture()
            .into_iter()
            .filter(|c| c.key == "0.0.0" || c.key == "0.0.1")
            .collect();
        let tree = assembler.assemble("doc", &hits).await.unwrap();

        // Two leaves, one shared parent, one shared root.
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().len(), 1);
        let leaf_keys: Vec<&str> = tree
            .children("0.0")
            .iter()
            .map(|n| n.chunk.key.as_str())
            .collect();
        assert_eq!(leaf_keys, vec!["0.0.0", "0.0.1"]);
    }

    #[tokio::test]
    async fn outline_excludes_content_units() {
        let assembler = assembler_with_fixture().await;
        let tree = assembler.outline("doc").await.unwrap();
        assert_eq!(tree.len(), 3);
        assert!(!tree.contains("0.0.0"));
        let section_titles: Vec<&str> = tree
            .children("0")
            .iter()
            .map(|n| n.chunk.title.as_str())
            .collect();
        assert_eq!(section_titles, vec!["Background", "Findings"]);
    }

    #[tokio::test]
    async fn section_matches_title_fragment_and_returns_full_subtree() {
        let assembler = assembler_with_fixture().await;
        let tree = assembler.section("doc", "Backgr").await.unwrap().unwrap();
        assert_eq!(tree.len(), 3);
        assert!(tree.contains("0.0.0"));
        assert!(!tree.contains("0.1"));
        assert_eq!(tree.roots()[0].chunk.key, "0.0");
    }

    #[tokio::test]
    async fn section_prefers_the_earliest_match() {
        // Both "Report" and its children match the empty fragment; document
        // order puts the level-0 root first.
        let assembler = assembler_with_fixture().await;
        let tree = assembler.section("doc", "").await.unwrap().unwrap();
        assert_eq!(tree.roots()[0].chunk.key, "0");
        assert_eq!(tree.len(), 6);
    }

    #[tokio::test]
    async fn section_without_match_is_none() {
        let assembler = assembler_with_fixture().await;
        assert!(assembler.section("doc", "Nowhere").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn document_reconstructs_everything_in_order() {
        let assembler = assembler_with_fixture().await;
        let tree = assembler.document("doc").await.unwrap();
        assert_eq!(tree.len(), 6);
        let rendered = render_tree(&tree);
        let history = rendered.find("history paragraph").unwrap();
        let result = rendered.find("result paragraph").unwrap();
        assert!(history < result);
    }
}
