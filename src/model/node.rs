//! Transient tree view assembled from stored chunks at query time.
//!
//! The tree is an arena keyed by chunk key with `parent_key` as the only
//! graph edge, so there are no ownership cycles and the structure serializes
//! trivially. Nodes hold a non-owning parent back-reference used for
//! root-finding during reconstruction, never for traversal ordering.

use std::collections::HashMap;

use crate::model::chunk::Chunk;

/// One node of a reconstructed subtree.
#[derive(Debug, Clone)]
pub struct ChunkNode {
    pub chunk: Chunk,
    /// Key of the parent node *within this tree*, if attached.
    pub parent: Option<String>,
    /// Child keys in document order once [`ChunkTree::finalize`] has run.
    pub children: Vec<String>,
}

/// Arena of [`ChunkNode`]s built fresh per query and discarded afterwards.
#[derive(Debug, Clone, Default)]
pub struct ChunkTree {
    nodes: HashMap<String, ChunkNode>,
    roots: Vec<String>,
}

impl ChunkTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&ChunkNode> {
        self.nodes.get(key)
    }

    /// Inserts a chunk as an unattached node. No-op if the key is already
    /// present, so two matches sharing an ancestor reuse the same node.
    pub fn insert(&mut self, chunk: Chunk) {
        self.nodes.entry(chunk.key.clone()).or_insert(ChunkNode {
            chunk,
            parent: None,
            children: Vec::new(),
        });
    }

    /// Links `child_key` under `parent_key`. Both nodes must already be in
    /// the arena; duplicate links are ignored.
    pub fn attach(&mut self, parent_key: &str, child_key: &str) {
        if !self.nodes.contains_key(child_key) {
            return;
        }
        let Some(parent) = self.nodes.get_mut(parent_key) else {
            return;
        };
        if !parent.children.iter().any(|k| k == child_key) {
            parent.children.push(child_key.to_string());
        }
        if let Some(child) = self.nodes.get_mut(child_key) {
            child.parent = Some(parent_key.to_string());
        }
    }

    /// Follows parent back-references up to the tree-local root of `key`.
    pub fn root_of(&self, key: &str) -> Option<&ChunkNode> {
        let mut current = self.nodes.get(key)?;
        while let Some(parent_key) = &current.parent {
            current = self.nodes.get(parent_key)?;
        }
        Some(current)
    }

    /// Sorts every sibling group by chunk `index` and records the root set
    /// (nodes with no attached parent), ordered by (level, index) for
    /// deterministic traversal.
    pub fn finalize(&mut self) {
        let order: HashMap<String, u32> = self
            .nodes
            .values()
            .map(|node| (node.chunk.key.clone(), node.chunk.index))
            .collect();
        for node in self.nodes.values_mut() {
            node.children
                .sort_by_key(|key| order.get(key).copied().unwrap_or(u32::MAX));
        }
        let mut roots: Vec<&ChunkNode> = self
            .nodes
            .values()
            .filter(|node| node.parent.is_none())
            .collect();
        roots.sort_by_key(|node| (node.chunk.level, node.chunk.index, node.chunk.key.clone()));
        self.roots = roots.into_iter().map(|node| node.chunk.key.clone()).collect();
    }

    /// Root nodes in document order. Meaningful after [`finalize`](Self::finalize).
    pub fn roots(&self) -> Vec<&ChunkNode> {
        self.roots
            .iter()
            .filter_map(|key| self.nodes.get(key))
            .collect()
    }

    /// Ordered children of `key`.
    pub fn children(&self, key: &str) -> Vec<&ChunkNode> {
        self.nodes
            .get(key)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|k| self.nodes.get(k))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All keys in the arena, unordered.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chunk::Chunk;

    fn tree_with(chunks: Vec<Chunk>, links: &[(&str, &str)]) -> ChunkTree {
        let mut tree = ChunkTree::new();
        for chunk in chunks {
            tree.insert(chunk);
        }
        for (parent, child) in links {
            tree.attach(parent, child);
        }
        tree.finalize();
        tree
    }

    #[test]
    fn children_sorted_by_index_not_insertion_order() {
        let tree = tree_with(
            vec![
                Chunk::structural("r", "doc", "", 0, 0, "Root").with_children(true),
                Chunk::structural("b", "doc", "r", 1, 1, "B"),
                Chunk::structural("a", "doc", "r", 1, 0, "A"),
            ],
            &[("r", "b"), ("r", "a")],
        );
        let children = tree.children("r");
        let titles: Vec<&str> = children.iter().map(|n| n.chunk.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B"]);
    }

    #[test]
    fn duplicate_insert_keeps_first_node() {
        let mut tree = ChunkTree::new();
        tree.insert(Chunk::structural("k", "doc", "", 0, 0, "First"));
        tree.insert(Chunk::structural("k", "doc", "", 0, 0, "Second"));
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get("k").unwrap().chunk.title, "First");
    }

    #[test]
    fn root_of_walks_back_references() {
        let tree = tree_with(
            vec![
                Chunk::structural("r", "doc", "", 0, 0, "Root").with_children(true),
                Chunk::structural("m", "doc", "r", 1, 0, "Mid").with_children(true),
                Chunk::content_unit("l", "doc", "m", 2, 0, "leaf"),
            ],
            &[("r", "m"), ("m", "l")],
        );
        assert_eq!(tree.root_of("l").unwrap().chunk.key, "r");
        assert_eq!(tree.roots().len(), 1);
    }

    #[test]
    fn unattached_nodes_are_roots() {
        let tree = tree_with(
            vec![
                Chunk::structural("x", "doc", "", 0, 1, "Second root"),
                Chunk::structural("y", "doc", "", 0, 0, "First root"),
            ],
            &[],
        );
        let roots: Vec<&str> = tree.roots().iter().map(|n| n.chunk.key.as_str()).collect();
        assert_eq!(roots, vec!["y", "x"]);
    }
}
