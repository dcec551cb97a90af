//! Commit summarization and narrative derivation.
//!
//! [`Summarizer`] is the AI boundary: per-commit summaries, one overall
//! narrative, and top-N highlight extraction.  The provider may be down at
//! any time, so every caller pairs it with the deterministic fallbacks in
//! [`fallback`].  [`highlights`] holds the pure derivation logic that picks
//! the best available source for the video narrative.

pub mod content;
pub mod error;
pub mod fallback;
pub mod highlights;
pub mod provider;

pub use error::SummarizeError;
pub use provider::GenAiSummarizer;

use shiplog_types::{CommitInfo, CommitSummary, Highlight, RepoStats};

/// Natural-language summarization boundary.
///
/// All methods may fail with [`SummarizeError`]; failures are recoverable
/// for callers, which fall back to deterministic output instead of
/// propagating the error.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize each commit in one provider round-trip.
    ///
    /// The returned list is parallel to `commits` (same order, same length).
    async fn summarize_commits(
        &self,
        commits: &[CommitInfo],
    ) -> Result<Vec<CommitSummary>, SummarizeError>;

    /// One short narrative covering the whole window.
    async fn summarize_overall(
        &self,
        repo: &str,
        window: &str,
        stats: &RepoStats,
    ) -> Result<String, SummarizeError>;

    /// Extract up to `limit` highlights from free text.
    async fn extract_highlights(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Highlight>, SummarizeError>;
}
