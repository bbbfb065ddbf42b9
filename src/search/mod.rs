//! Retrieval strategies and subtree reconstruction.

pub mod engine;
pub mod reconstruct;

pub use engine::{SearchEngine, SearchStrategy};
pub use reconstruct::{render_tree, TreeAssembler};
