//! Chunk data model: persisted records and the transient query-time tree.

pub mod chunk;
pub mod node;

pub use chunk::{Chunk, ChunkKind, validate_chunks};
pub use node::{ChunkNode, ChunkTree};
