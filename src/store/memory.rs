//! In-process vector engine with cosine similarity.
//!
//! The default engine for tests and small corpora; collections live in a
//! map guarded by an async lock, so readers during a write observe either
//! the old or the new value of a record, never a torn one.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::embeddings::is_zero_vector;
use crate::model::chunk::Chunk;
use crate::store::{ChunkFilter, ScoredChunk, VectorEngine, VectorField, VectorRecord};
use crate::types::Result;

type Collection = HashMap<String, VectorRecord>;

#[derive(Clone, Default)]
pub struct MemoryVectorEngine {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryVectorEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorEngine for MemoryVectorEngine {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(collection))
    }

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()> {
        let mut guard = self.collections.write().await;
        let slot = guard.entry(collection.to_string()).or_default();
        for record in records {
            slot.insert(record.chunk.key.clone(), record);
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: &str,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let guard = self.collections.read().await;
        let Some(slot) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(slot
            .values()
            .filter(|record| filter.matches(&record.chunk))
            .take(limit)
            .map(|record| record.chunk.clone())
            .collect())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        field: VectorField,
        filter: &ChunkFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let guard = self.collections.read().await;
        let Some(slot) = guard.get(collection) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<ScoredChunk> = slot
            .values()
            .filter(|record| filter.matches(&record.chunk))
            .filter_map(|record| {
                let target = match field {
                    VectorField::Text => &record.text_embedding,
                    VectorField::Summary => &record.summary_embedding,
                };
                if is_zero_vector(target) {
                    return None;
                }
                Some(ScoredChunk {
                    chunk: record.chunk.clone(),
                    score: cosine_similarity(vector, target),
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete_collection(&self, collection: &str) -> Result<()> {
        self.collections.write().await.remove(collection);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::chunk::ChunkKind;

    fn record(key: &str, index: u32, text_embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk: Chunk::content_unit(key, "doc", "root", 1, index, "body"),
            text_embedding,
            summary_embedding: vec![0.0, 0.0],
        }
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let engine = MemoryVectorEngine::new();
        engine
            .upsert(
                "c",
                vec![
                    record("far", 0, vec![0.0, 1.0]),
                    record("near", 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        let hits = engine
            .search("c", &[1.0, 0.0], VectorField::Text, &ChunkFilter::any(), 10)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.key, "near");
    }

    #[tokio::test]
    async fn ties_break_on_lower_index() {
        let engine = MemoryVectorEngine::new();
        engine
            .upsert(
                "c",
                vec![
                    record("second", 3, vec![1.0, 0.0]),
                    record("first", 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        let hits = engine
            .search("c", &[1.0, 0.0], VectorField::Text, &ChunkFilter::any(), 10)
            .await
            .unwrap();
        assert_eq!(hits[0].chunk.key, "first");
        assert_eq!(hits[1].chunk.key, "second");
    }

    #[tokio::test]
    async fn zero_vector_fields_are_unsearchable() {
        let engine = MemoryVectorEngine::new();
        engine
            .upsert("c", vec![record("only", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        // Summary embeddings are all zero in `record`, so summary search
        // finds nothing.
        let hits = engine
            .search("c", &[1.0, 0.0], VectorField::Summary, &ChunkFilter::any(), 10)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn missing_collection_reads_as_empty() {
        let engine = MemoryVectorEngine::new();
        let chunks = engine.get("nope", &ChunkFilter::any(), 10).await.unwrap();
        assert!(chunks.is_empty());
        assert!(!engine.collection_exists("nope").await.unwrap());
    }

    #[tokio::test]
    async fn upsert_replaces_by_key() {
        let engine = MemoryVectorEngine::new();
        engine
            .upsert("c", vec![record("k", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        let mut replacement = record("k", 0, vec![0.0, 1.0]);
        replacement.chunk.text = "updated".into();
        engine.upsert("c", vec![replacement]).await.unwrap();

        let filter = ChunkFilter::any().kind(ChunkKind::ContentUnit).key("k");
        let chunks = engine.get("c", &filter, 10).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "updated");
    }
}
