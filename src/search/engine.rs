//! The three retrieval strategies over a [`ChunkStore`].
//!
//! Every strategy returns a ranked, deduplicated flat hit list; callers
//! expand it into a subtree with the reconstructor. Ordering is similarity
//! descending with exact ties broken by lower sibling `index`, keeping
//! results deterministic for a fixed store snapshot.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::model::chunk::ChunkKind;
use crate::store::{ChunkFilter, ChunkStore, ScoredChunk, VectorField};
use crate::types::{ChunkError, Result};

/// How many level-0 roots the top-down descent starts from. Tunable
/// implementation constant, deliberately small: the roots only steer which
/// branches get explored.
const TOP_DOWN_ROOT_BREADTH: usize = 3;
/// Per-level child fan-out during top-down descent.
const TOP_DOWN_CHILD_BREADTH: usize = 10;
/// Seed hits for the recursive strategy's first round.
const RECURSIVE_INITIAL_HITS: usize = 5;
/// Expansion queries issued (and hits kept) per recursive round.
const RECURSIVE_PER_ROUND: usize = 3;

/// Strategy selector for [`SearchEngine::search`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStrategy {
    /// Flat vector search over content-unit text. No structural awareness.
    Default,
    /// Summary-guided descent from document roots toward matching leaves.
    TopDown,
    /// Query expansion through the summaries of already-found chunks.
    Recursive { rounds: usize },
}

pub struct SearchEngine {
    store: Arc<ChunkStore>,
}

impl SearchEngine {
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// Runs one strategy; `top_k` bounds the final result count, never the
    /// intermediate fan-out.
    pub async fn search(
        &self,
        query: &str,
        doc_id: &str,
        top_k: usize,
        strategy: SearchStrategy,
    ) -> Result<Vec<ScoredChunk>> {
        validate_query(query, doc_id)?;
        if top_k == 0 {
            return Ok(Vec::new());
        }
        match strategy {
            SearchStrategy::Default => self.search_default(query, doc_id, top_k).await,
            SearchStrategy::TopDown => self.search_top_down(query, doc_id, top_k).await,
            SearchStrategy::Recursive { rounds } => {
                self.search_recursive(query, doc_id, top_k, rounds).await
            }
        }
    }

    /// Single similarity search over all content-unit text embeddings.
    pub async fn search_default(
        &self,
        query: &str,
        doc_id: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.store.embedder().embed(query).await?;
        let hits = self
            .store
            .search(
                doc_id,
                &query_vector,
                VectorField::Text,
                &ChunkFilter::any().kind(ChunkKind::ContentUnit),
                top_k,
            )
            .await?;
        Ok(rank(hits, top_k))
    }

    /// Descends the structural tree by summary similarity: a handful of
    /// level-0 roots, then wider per-level child searches, until nodes
    /// without children are reached. Terminal hits carry the score of the
    /// deepest matching step, biasing results toward sections whose own
    /// description matches the query.
    pub async fn search_top_down(
        &self,
        query: &str,
        doc_id: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.store.embedder().embed(query).await?;
        let roots = self
            .store
            .search(
                doc_id,
                &query_vector,
                VectorField::Summary,
                &ChunkFilter::any().level(0),
                TOP_DOWN_ROOT_BREADTH,
            )
            .await?;

        let mut frontier: VecDeque<ScoredChunk> = roots.into();
        let mut seen: HashSet<String> = HashSet::new();
        let mut terminals: Vec<ScoredChunk> = Vec::new();

        while let Some(hit) = frontier.pop_front() {
            if !seen.insert(hit.chunk.key.clone()) {
                continue;
            }
            if !hit.chunk.has_child_node {
                terminals.push(hit);
                continue;
            }
            let children = self
                .store
                .search(
                    doc_id,
                    &query_vector,
                    VectorField::Summary,
                    &ChunkFilter::any().parent_key(hit.chunk.key.clone()),
                    TOP_DOWN_CHILD_BREADTH,
                )
                .await?;
            if children.is_empty() {
                // Children exist but none is summary-searchable yet; the
                // branch bottoms out here.
                terminals.push(hit);
            } else {
                frontier.extend(children);
            }
        }

        tracing::debug!(doc_id, terminals = terminals.len(), "top-down descent finished");
        Ok(rank(terminals, top_k))
    }

    /// Seeds from content-unit text hits, then for `rounds` rounds re-queries
    /// with each previously found chunk's summary (falling back to its text
    /// when no summary exists), accumulating hits. Issues at most
    /// `1 + rounds * RECURSIVE_PER_ROUND` vector queries.
    pub async fn search_recursive(
        &self,
        query: &str,
        doc_id: &str,
        top_k: usize,
        rounds: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let query_vector = self.store.embedder().embed(query).await?;
        let unit_filter = ChunkFilter::any().kind(ChunkKind::ContentUnit);
        let mut pool = self
            .store
            .search(
                doc_id,
                &query_vector,
                VectorField::Text,
                &unit_filter,
                RECURSIVE_INITIAL_HITS,
            )
            .await?;

        let mut known: HashSet<String> = pool.iter().map(|hit| hit.chunk.key.clone()).collect();
        let mut frontier: Vec<ScoredChunk> = pool.clone();

        for round in 0..rounds {
            let mut discovered: Vec<ScoredChunk> = Vec::new();
            for hit in frontier.iter().take(RECURSIVE_PER_ROUND) {
                let expansion = if hit.chunk.summary.is_empty() {
                    hit.chunk.text.as_str()
                } else {
                    hit.chunk.summary.as_str()
                };
                if expansion.trim().is_empty() {
                    continue;
                }
                let expansion_vector = self.store.embedder().embed(expansion).await?;
                let found = self
                    .store
                    .search(
                        doc_id,
                        &expansion_vector,
                        VectorField::Text,
                        &unit_filter,
                        RECURSIVE_PER_ROUND,
                    )
                    .await?;
                discovered.extend(
                    found
                        .into_iter()
                        .filter(|hit| known.insert(hit.chunk.key.clone())),
                );
            }
            if discovered.is_empty() {
                tracing::trace!(round, "recursive expansion converged early");
                break;
            }
            pool.extend(discovered.clone());
            frontier = discovered;
        }

        Ok(rank(pool, top_k))
    }
}

fn validate_query(query: &str, doc_id: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(ChunkError::InvalidArgument("empty query".into()));
    }
    if doc_id.trim().is_empty() {
        return Err(ChunkError::InvalidArgument("empty document id".into()));
    }
    Ok(())
}

/// Deduplicates by key (best score wins), applies the deterministic
/// ordering, and truncates to `top_k`.
fn rank(hits: Vec<ScoredChunk>, top_k: usize) -> Vec<ScoredChunk> {
    let mut best: HashMap<String, ScoredChunk> = HashMap::with_capacity(hits.len());
    for hit in hits {
        match best.get(&hit.chunk.key) {
            Some(kept) if kept.score >= hit.score => {}
            _ => {
                best.insert(hit.chunk.key.clone(), hit);
            }
        }
    }
    let mut ranked: Vec<ScoredChunk> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.chunk.index.cmp(&b.chunk.index))
            .then(a.chunk.key.cmp(&b.chunk.key))
    });
    ranked.truncate(top_k);
    ranked
}
