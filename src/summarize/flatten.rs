//! Flattening of a summarized tree into persistable chunk records.
//!
//! Keys are deterministic path strings ("0", "0.1", "0.1.2") so re-indexing
//! an unchanged document produces an identical collection. Depth is
//! recomputed from tree shape, keeping the parent/level invariant intact
//! even when an extractor reports uneven levels.

use crate::model::chunk::{Chunk, ChunkKind};
use crate::summarize::pipeline::SummarizedNode;

/// Converts summarized roots into the flat chunk set for `doc_id`.
///
/// Under one parent, content-unit chunks take the leading sibling indexes in
/// extraction order, followed by structural children. A childless section
/// additionally carries its concatenated unit text so its text embedding is
/// meaningful.
pub fn flatten(doc_id: &str, roots: &[SummarizedNode]) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    for (index, root) in roots.iter().enumerate() {
        let key = index.to_string();
        flatten_node(doc_id, root, "", &key, 0, index as u32, &mut chunks);
    }
    chunks
}

fn flatten_node(
    doc_id: &str,
    node: &SummarizedNode,
    parent_key: &str,
    key: &str,
    level: u32,
    index: u32,
    out: &mut Vec<Chunk>,
) {
    let has_child = !node.children.is_empty();
    let text = if has_child {
        String::new()
    } else {
        node.content_units
            .iter()
            .map(|unit| unit.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    };

    out.push(Chunk {
        key: key.to_string(),
        doc_id: doc_id.to_string(),
        parent_key: parent_key.to_string(),
        level,
        index,
        title: node.title.clone(),
        text,
        summary: node.summary.clone(),
        has_child_node: has_child,
        kind: ChunkKind::Structural,
    });

    let mut sibling = 0u32;
    for unit in &node.content_units {
        if unit.text.is_empty() {
            continue;
        }
        out.push(Chunk::content_unit(
            format!("{key}.{sibling}"),
            doc_id,
            key,
            level + 1,
            sibling,
            unit.text.clone(),
        ));
        sibling += 1;
    }
    for child in &node.children {
        let child_key = format!("{key}.{sibling}");
        flatten_node(doc_id, child, key, &child_key, level + 1, sibling, out);
        sibling += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::RawContentUnit;
    use crate::model::chunk::validate_chunks;

    fn summarized(title: &str, summary: &str) -> SummarizedNode {
        SummarizedNode {
            title: title.into(),
            content_units: vec![],
            summary: summary.into(),
            children: vec![],
        }
    }

    fn sample_tree() -> Vec<SummarizedNode> {
        let mut leaf = summarized("1.1 Background", "background summary");
        leaf.content_units = vec![
            RawContentUnit::text("first paragraph"),
            RawContentUnit::text("second paragraph"),
        ];
        let mut section = summarized("1 Overview", "overview summary");
        section.children = vec![leaf, summarized("1.2 Goals", "goals summary")];
        vec![section, summarized("2 Appendix", "appendix summary")]
    }

    #[test]
    fn flattened_set_satisfies_invariants() {
        let chunks = flatten("doc", &sample_tree());
        validate_chunks(&chunks).unwrap();
    }

    #[test]
    fn two_roots_both_level_zero_with_empty_parent() {
        let chunks = flatten("doc", &sample_tree());
        let roots: Vec<&Chunk> = chunks.iter().filter(|c| c.is_root()).collect();
        assert_eq!(roots.len(), 2);
        assert!(roots.iter().all(|c| c.level == 0));
    }

    #[test]
    fn content_units_precede_structural_children() {
        let chunks = flatten("doc", &sample_tree());
        let background = chunks.iter().find(|c| c.title == "1.1 Background").unwrap();
        let units: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| c.parent_key == background.key && c.kind == ChunkKind::ContentUnit)
            .collect();
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].index, 0);
        assert_eq!(units[0].text, "first paragraph");
        assert_eq!(units[1].index, 1);
    }

    #[test]
    fn childless_section_carries_concatenated_text() {
        let chunks = flatten("doc", &sample_tree());
        let background = chunks.iter().find(|c| c.title == "1.1 Background").unwrap();
        assert!(!background.has_child_node);
        assert_eq!(background.text, "first paragraph\nsecond paragraph");

        let overview = chunks.iter().find(|c| c.title == "1 Overview").unwrap();
        assert!(overview.has_child_node);
        assert!(overview.text.is_empty());
    }

    #[test]
    fn flatten_is_deterministic() {
        let tree = sample_tree();
        assert_eq!(flatten("doc", &tree), flatten("doc", &tree));
    }
}
