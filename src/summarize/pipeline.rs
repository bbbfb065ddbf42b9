//! Bottom-up tree summarization with bounded concurrency.
//!
//! Each top-level root gets its own task; inside a root, plain depth-first
//! recursion guarantees children are summarized before their parent. A
//! semaphore bounds concurrent *external* summarizer calls only, so cache
//! hits and short texts never consume a permit.

use futures_util::future::BoxFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::extract::{RawContentUnit, RawNode};
use crate::summarize::cache::SummaryCache;
use crate::summarize::prompt::summary_prompt;
use crate::types::{ChunkError, Result};

/// LLM delegate that condenses one prompt into a summary string.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String>;
}

/// Cooperative cancellation shared by a batch and its caller.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Callback invoked after every summarized node with (visited, total).
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SummarizeOptions {
    /// Target language for summaries; caller-supplied, never detected.
    pub language: String,
    /// Raw text shorter than this is returned unchanged, with no LLM call.
    pub trigger_len: usize,
    /// Upper bound, in characters, requested from the summarizer.
    pub output_budget: usize,
    /// Maximum concurrent external summarizer calls.
    pub parallelism: usize,
    /// Bounded retries per external call before the batch fails.
    pub max_retries: usize,
}

impl Default for SummarizeOptions {
    fn default() -> Self {
        Self {
            language: "English".to_string(),
            trigger_len: 300,
            output_budget: 512,
            parallelism: 4,
            max_retries: 2,
        }
    }
}

/// A [`RawNode`] annotated with its computed summary.
#[derive(Debug, Clone)]
pub struct SummarizedNode {
    pub title: String,
    pub content_units: Vec<RawContentUnit>,
    pub summary: String,
    pub children: Vec<SummarizedNode>,
}

/// Terminal state of a batch. Cancellation is an aborted operation, not an
/// error; real failures come back through `Err`.
#[derive(Debug)]
pub enum SummarizeOutcome {
    Completed(Vec<SummarizedNode>),
    Cancelled,
}

/// Walks an extracted document tree bottom-up, producing one summary per
/// node through the injected [`Summarizer`] and [`SummaryCache`].
pub struct SummarizePipeline {
    summarizer: Arc<dyn Summarizer>,
    cache: SummaryCache,
    options: SummarizeOptions,
    progress: Option<ProgressFn>,
}

impl SummarizePipeline {
    pub fn new(summarizer: Arc<dyn Summarizer>, cache: SummaryCache) -> Self {
        Self {
            summarizer,
            cache,
            options: SummarizeOptions::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: SummarizeOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    /// Summarizes every node of `roots`, loading the cache first and
    /// flushing it afterwards (also after cancellation, so completed
    /// summaries survive for a retry).
    ///
    /// Any branch's summarizer failure cancels the whole batch and surfaces
    /// as the returned error. External cancellation through `cancel` yields
    /// `Ok(SummarizeOutcome::Cancelled)`.
    pub async fn run(
        &self,
        roots: Vec<RawNode>,
        cancel: &CancelToken,
    ) -> Result<SummarizeOutcome> {
        self.cache.load().await?;

        let total: usize = roots.iter().map(RawNode::node_count).sum();
        tracing::debug!(total, roots = roots.len(), "summarization batch started");

        let ctx = WorkerCtx {
            summarizer: Arc::clone(&self.summarizer),
            cache: self.cache.clone(),
            options: self.options.clone(),
            semaphore: Arc::new(Semaphore::new(self.options.parallelism.max(1))),
            cancel: cancel.clone(),
            visited: Arc::new(AtomicUsize::new(0)),
            total,
            progress: self.progress.clone(),
        };

        let mut handles = Vec::with_capacity(roots.len());
        for root in roots {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(summarize_subtree(ctx, root)));
        }

        let mut summarized = Vec::with_capacity(handles.len());
        let mut failure: Option<ChunkError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(node)) => summarized.push(node),
                Ok(Err(ChunkError::Cancelled)) => {}
                Ok(Err(err)) => {
                    cancel.cancel();
                    failure.get_or_insert(err);
                }
                Err(err) => {
                    cancel.cancel();
                    failure.get_or_insert(ChunkError::ExternalService(format!(
                        "summarization worker panicked: {err}"
                    )));
                }
            }
        }

        self.cache.flush().await?;

        if let Some(err) = failure {
            tracing::warn!(%err, "summarization batch failed");
            return Err(err);
        }
        if cancel.is_cancelled() {
            tracing::debug!("summarization batch cancelled");
            return Ok(SummarizeOutcome::Cancelled);
        }
        tracing::debug!(total, "summarization batch completed");
        Ok(SummarizeOutcome::Completed(summarized))
    }
}

#[derive(Clone)]
struct WorkerCtx {
    summarizer: Arc<dyn Summarizer>,
    cache: SummaryCache,
    options: SummarizeOptions,
    semaphore: Arc<Semaphore>,
    cancel: CancelToken,
    visited: Arc<AtomicUsize>,
    total: usize,
    progress: Option<ProgressFn>,
}

fn summarize_subtree(
    ctx: WorkerCtx,
    node: RawNode,
) -> BoxFuture<'static, Result<SummarizedNode>> {
    Box::pin(async move {
        if ctx.cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }

        let mut children = Vec::with_capacity(node.children.len());
        for child in node.children {
            children.push(summarize_subtree(ctx.clone(), child).await?);
        }

        let raw = if children.is_empty() {
            leaf_raw_text(&node.content_units)
        } else {
            branch_raw_text(&node.title, &children)
        };
        let summary = summarize_raw(&ctx, &raw).await?;

        let visited = ctx.visited.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(progress) = &ctx.progress {
            progress(visited, ctx.total);
        }
        tracing::trace!(visited, total = ctx.total, title = %node.title, "node summarized");

        Ok(SummarizedNode {
            title: node.title,
            content_units: node.content_units,
            summary,
            children,
        })
    })
}

/// A leaf summarizes the concatenation of its content units, in order.
fn leaf_raw_text(units: &[RawContentUnit]) -> String {
    units
        .iter()
        .map(|unit| unit.text.as_str())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// A branch summarizes its own title plus each direct child's title and
/// already-computed summary. Grandchildren never contribute directly.
fn branch_raw_text(title: &str, children: &[SummarizedNode]) -> String {
    let mut raw = title.to_string();
    for child in children {
        if !child.title.is_empty() {
            raw.push('\n');
            raw.push_str(&child.title);
        }
        if !child.summary.is_empty() {
            raw.push('\n');
            raw.push_str(&child.summary);
        }
    }
    raw
}

async fn summarize_raw(ctx: &WorkerCtx, raw: &str) -> Result<String> {
    if raw.chars().count() < ctx.options.trigger_len {
        return Ok(raw.to_string());
    }
    if let Some(hit) = ctx.cache.get(raw).await {
        return Ok(hit);
    }

    let prompt = summary_prompt(&ctx.options.language, raw, ctx.options.output_budget);
    let mut attempt = 0usize;
    let summary = loop {
        if ctx.cancel.is_cancelled() {
            return Err(ChunkError::Cancelled);
        }
        let outcome = {
            // Permit held only for the duration of the external call.
            let _permit = ctx
                .semaphore
                .acquire()
                .await
                .map_err(|_| ChunkError::ExternalService("summarizer pool closed".into()))?;
            ctx.summarizer.summarize(&prompt).await
        };
        match outcome {
            Ok(summary) => break summary,
            Err(err) if attempt < ctx.options.max_retries && !err.is_cancelled() => {
                attempt += 1;
                tracing::warn!(attempt, %err, "summarizer call failed, retrying");
                tokio::time::sleep(retry_backoff(attempt)).await;
            }
            Err(err) => {
                ctx.cancel.cancel();
                return Err(err);
            }
        }
    };

    ctx.cache.insert(raw, &summary).await;
    Ok(summary)
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(100 * (1 << capped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::RawContentUnit;

    #[test]
    fn leaf_raw_text_joins_units_in_order() {
        let units = vec![
            RawContentUnit::text("first"),
            RawContentUnit::text(""),
            RawContentUnit::text("second"),
        ];
        assert_eq!(leaf_raw_text(&units), "first\nsecond");
    }

    #[test]
    fn branch_raw_text_uses_direct_children_only() {
        let grandchild = SummarizedNode {
            title: "G".into(),
            content_units: vec![],
            summary: "grandchild summary".into(),
            children: vec![],
        };
        let child = SummarizedNode {
            title: "C".into(),
            content_units: vec![],
            summary: "child summary".into(),
            children: vec![grandchild],
        };
        let raw = branch_raw_text("Parent", &[child]);
        assert!(raw.contains("child summary"));
        assert!(!raw.contains("grandchild summary"));
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert!(retry_backoff(1) < retry_backoff(2));
        assert_eq!(retry_backoff(5), retry_backoff(9));
    }
}
