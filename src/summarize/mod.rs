//! Bottom-up summarization: cache, prompt, pipeline, and flattening into
//! chunk records.

pub mod cache;
pub mod flatten;
pub mod pipeline;
pub mod prompt;

pub use cache::{CacheScope, SummaryCache};
pub use flatten::flatten;
pub use pipeline::{
    CancelToken, ProgressFn, SummarizeOptions, SummarizeOutcome, SummarizePipeline,
    SummarizedNode, Summarizer,
};
pub use prompt::summary_prompt;
