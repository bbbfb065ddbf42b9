//! Chunk persistence over an injected vector index engine.
//!
//! [`ChunkStore`] translates between [`Chunk`] records and the engine's
//! vector records, computing both embeddings at write time. The engine seam
//! mirrors a key-value + similarity store: one collection per document id,
//! upserts atomic per key.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::embeddings::EmbeddingProvider;
use crate::model::chunk::{Chunk, ChunkKind};
use crate::types::{ChunkError, Result};

pub use memory::MemoryVectorEngine;
pub use sqlite::SqliteVectorEngine;

/// Which derived embedding a similarity search runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorField {
    /// Embedding of the chunk's raw text. Meaningful for content units and
    /// childless structural chunks.
    Text,
    /// Embedding of the chunk's summary. Meaningful once summarization has
    /// filled it in.
    Summary,
}

/// A chunk paired with its two derived vectors, as stored by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk: Chunk,
    /// Zero vector when the chunk has no embeddable text.
    pub text_embedding: Vec<f32>,
    /// Zero vector when the chunk has no summary.
    pub summary_embedding: Vec<f32>,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Conjunctive predicate over chunk fields, evaluated by the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkFilter {
    pub kind: Option<ChunkKind>,
    pub level: Option<u32>,
    pub parent_key: Option<String>,
    pub key: Option<String>,
}

impl ChunkFilter {
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn kind(mut self, kind: ChunkKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn parent_key(mut self, parent_key: impl Into<String>) -> Self {
        self.parent_key = Some(parent_key.into());
        self
    }

    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        self.kind.is_none_or(|kind| chunk.kind == kind)
            && self.level.is_none_or(|level| chunk.level == level)
            && self
                .parent_key
                .as_deref()
                .is_none_or(|parent| chunk.parent_key == parent)
            && self.key.as_deref().is_none_or(|key| chunk.key == key)
    }
}

/// Key-value + vector similarity engine, scoped to named collections.
///
/// Records whose selected embedding is a zero vector carry no signal and are
/// excluded from similarity results; this is what keeps structural chunks
/// out of summary search until their summary is computed.
#[async_trait]
pub trait VectorEngine: Send + Sync {
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    /// Inserts or replaces records by chunk key. Atomic per key; not
    /// transactional across the batch.
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<()>;

    /// Unordered filter scan. A missing collection yields an empty result.
    async fn get(
        &self,
        collection: &str,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>>;

    /// Similarity search over `field`, most similar first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        field: VectorField,
        filter: &ChunkFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// Drops the collection. Idempotent; missing collections are a no-op.
    async fn delete_collection(&self, collection: &str) -> Result<()>;
}

/// Persists and retrieves a document's chunks, embedding them on the way in.
#[derive(Clone)]
pub struct ChunkStore {
    engine: Arc<dyn VectorEngine>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ChunkStore {
    pub fn new(engine: Arc<dyn VectorEngine>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { engine, embedder }
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Maps a document id onto its physical collection name.
    ///
    /// Ids that need sanitizing get a hash of the original id appended, so
    /// distinct ids like `"a b"` and `"a_b"` never share a collection.
    pub fn collection_name(doc_id: &str) -> String {
        let mut changed = false;
        let sanitized: String = doc_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    changed = true;
                    '_'
                }
            })
            .collect();
        if !changed {
            return format!("doc_{sanitized}");
        }
        // FNV-1a over the original id.
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in doc_id.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        format!("doc_{sanitized}_{hash:016x}")
    }

    /// Embeds and upserts `chunks` into the document's collection.
    ///
    /// Not transactional: on failure the collection may hold a partial
    /// write, and the caller is expected to roll back with
    /// [`remove_document`](Self::remove_document).
    pub async fn add_document(&self, doc_id: &str, chunks: Vec<Chunk>) -> Result<()> {
        if doc_id.trim().is_empty() {
            return Err(ChunkError::InvalidArgument("empty document id".into()));
        }
        if self.embedder.dimensions() == 0 {
            return Err(ChunkError::NotInitialized(
                "embedding provider reports zero dimensions".into(),
            ));
        }
        let collection = Self::collection_name(doc_id);
        self.engine.ensure_collection(&collection).await?;
        if chunks.is_empty() {
            return Ok(());
        }

        let text_inputs: Vec<String> = chunks
            .iter()
            .map(|chunk| chunk.embeddable_text().unwrap_or("").to_string())
            .collect();
        let summary_inputs: Vec<String> = chunks
            .iter()
            .map(|chunk| chunk.embeddable_summary().unwrap_or("").to_string())
            .collect();
        let text_vectors = self.embedder.embed_with_blanks(&text_inputs).await?;
        let summary_vectors = self.embedder.embed_with_blanks(&summary_inputs).await?;

        let records: Vec<VectorRecord> = chunks
            .into_iter()
            .zip(text_vectors.into_iter().zip(summary_vectors))
            .map(|(chunk, (text_embedding, summary_embedding))| VectorRecord {
                chunk,
                text_embedding,
                summary_embedding,
            })
            .collect();

        tracing::debug!(doc_id, count = records.len(), "persisting chunks");
        self.engine.upsert(&collection, records).await
    }

    /// Drops the document's collection. No-op if it does not exist.
    pub async fn remove_document(&self, doc_id: &str) -> Result<()> {
        if doc_id.trim().is_empty() {
            return Err(ChunkError::InvalidArgument("empty document id".into()));
        }
        let collection = Self::collection_name(doc_id);
        if !self.engine.collection_exists(&collection).await? {
            return Ok(());
        }
        tracing::debug!(doc_id, "dropping document collection");
        self.engine.delete_collection(&collection).await
    }

    /// Unordered matches; callers sort by `index` when order matters.
    pub async fn get_by_filter(
        &self,
        doc_id: &str,
        filter: &ChunkFilter,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        self.engine
            .get(&Self::collection_name(doc_id), filter, limit)
            .await
    }

    /// Point lookup; a missing key is `None`, not an error.
    pub async fn get_by_key(&self, doc_id: &str, key: &str) -> Result<Option<Chunk>> {
        let mut found = self
            .engine
            .get(
                &Self::collection_name(doc_id),
                &ChunkFilter::any().key(key),
                1,
            )
            .await?;
        Ok(found.pop())
    }

    /// Similarity search delegated to the engine.
    pub async fn search(
        &self,
        doc_id: &str,
        vector: &[f32],
        field: VectorField,
        filter: &ChunkFilter,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        self.engine
            .search(&Self::collection_name(doc_id), vector, field, filter, top_k)
            .await
    }
}
