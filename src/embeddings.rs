//! Embedding generator seam and a deterministic mock for tests.

use async_trait::async_trait;

use crate::types::Result;

/// Generates embedding vectors for text. Implementations wrap a remote model
/// endpoint; the crate only ever calls them from async contexts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short identifier for logging and telemetry.
    fn name(&self) -> &str;

    /// Output vector width.
    fn dimensions(&self) -> usize;

    /// Embeds a single non-empty text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of non-empty texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Batch variant that tolerates empty inputs: blanks become zero vectors
    /// without a round trip, everything else goes through one
    /// [`embed_batch`](Self::embed_batch) call.
    async fn embed_with_blanks(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let filled: Vec<(usize, String)> = texts
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| (i, text.clone()))
            .collect();

        let mut out = vec![vec![0.0; self.dimensions()]; texts.len()];
        if filled.is_empty() {
            return Ok(out);
        }

        let inputs: Vec<String> = filled.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.embed_batch(&inputs).await?;
        for ((slot, _), vector) in filled.into_iter().zip(vectors) {
            out[slot] = vector;
        }
        Ok(out)
    }
}

/// Returns `true` when every component is zero, i.e. the vector came from a
/// blank input and carries no signal.
pub fn is_zero_vector(vector: &[f32]) -> bool {
    vector.iter().all(|v| *v == 0.0)
}

/// Deterministic offline provider: hashes each lowercase word into a bucket
/// of a fixed-width vector, so texts sharing vocabulary land near each other.
/// Suitable for tests and examples, not for retrieval quality.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self { dimensions: 64 }
    }
}

impl MockEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dimensions(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, word: &str) -> usize {
        // FNV-1a, good enough for stable word buckets.
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimensions as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            vector[self.bucket(&word.to_lowercase())] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}
