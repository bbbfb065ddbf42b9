//! ```text
//! DocumentExtractor ──► RawNode tree
//!                          │
//!                          ▼
//! summarize::SummarizePipeline ──► SummarizedNode tree ──► summarize::flatten
//!          │                                                     │
//!          ├─► summarize::cache (content-addressed)              ▼
//!          └─► providers::OllamaSummarizer              Vec<Chunk> ──► store::ChunkStore
//!                                                                          │
//!                                          ┌───────────────────────────────┤
//!                                          ▼                               ▼
//!                        store::MemoryVectorEngine          store::SqliteVectorEngine
//!                                          │                               │
//!                                          └───────────────┬───────────────┘
//!                                                          ▼
//!                         search::SearchEngine ──► search::TreeAssembler ──► ChunkTree
//! ```
//!
pub mod embeddings;
pub mod extract;
pub mod model;
pub mod providers;
pub mod search;
pub mod store;
pub mod summarize;
pub mod types;

pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider};
pub use extract::{DocumentExtractor, RawContentUnit, RawNode};
pub use model::chunk::{validate_chunks, Chunk, ChunkKind};
pub use model::node::{ChunkNode, ChunkTree};
pub use providers::{OllamaClient, OllamaEmbedder, OllamaSummarizer};
pub use search::{SearchEngine, SearchStrategy, TreeAssembler};
pub use store::{
    ChunkFilter, ChunkStore, MemoryVectorEngine, ScoredChunk, SqliteVectorEngine, VectorEngine,
    VectorField, VectorRecord,
};
pub use summarize::{
    flatten, CancelToken, SummarizeOptions, SummarizeOutcome, SummarizePipeline, SummarizedNode,
    Summarizer, SummaryCache,
};
pub use types::{ChunkError, Result};
