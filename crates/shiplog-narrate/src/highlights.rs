//! Highlight derivation for the video narrative.
//!
//! Sources are tried in strict priority order, first non-empty wins:
//! a manual override, AI extraction from the final content, AI extraction
//! from the raw commit summaries, then nothing (the video stage is skipped).

use tracing::warn;

use shiplog_types::{CommitSummary, Highlight, VideoNarrative};

use crate::Summarizer;

/// Highlight reel length.
pub const TOP_HIGHLIGHTS: usize = 3;
/// Top-highlight titles longer than this are ellipsized.
const TITLE_MAX: usize = 60;
/// Scrolling-list entries longer than this are ellipsized.
const SCROLLING_MAX: usize = 50;
/// Final content shorter than this is not worth extracting from; fall
/// through to the raw summaries instead.
const CONTENT_FLOOR: usize = 80;

/// Derive the narrative for one record from whatever sources exist.
///
/// Never fails: AI extraction errors are logged and demote to the next
/// source, and an empty narrative is a valid outcome.
pub async fn derive(
    summarizer: &dyn Summarizer,
    manual: Option<&VideoNarrative>,
    content: Option<&str>,
    summaries: &[CommitSummary],
) -> VideoNarrative {
    let scrolling = scrolling_changes(summaries);

    // 1. Manual override wins outright, regardless of richer sources.
    if let Some(manual) = manual {
        if !manual.top_highlights.is_empty() {
            let scrolling_changes = if manual.scrolling_changes.is_empty() {
                scrolling
            } else {
                manual.scrolling_changes.clone()
            };
            return VideoNarrative {
                top_highlights: manual.top_highlights.clone(),
                scrolling_changes,
            };
        }
    }

    // 2. The assembled content reflects post-editing text, so prefer it when
    //    there is enough of it.
    if let Some(content) = content.filter(|c| c.chars().count() >= CONTENT_FLOOR) {
        match summarizer.extract_highlights(content, TOP_HIGHLIGHTS).await {
            Ok(highlights) if !highlights.is_empty() => {
                return VideoNarrative {
                    top_highlights: shape(highlights),
                    scrolling_changes: scrolling,
                };
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "highlight extraction from content failed"),
        }
    }

    // 3. Raw per-commit summaries.
    if !summaries.is_empty() {
        let joined = summaries
            .iter()
            .map(|s| s.summary.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        match summarizer.extract_highlights(&joined, TOP_HIGHLIGHTS).await {
            Ok(highlights) if !highlights.is_empty() => {
                return VideoNarrative {
                    top_highlights: shape(highlights),
                    scrolling_changes: scrolling,
                };
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "highlight extraction from summaries failed"),
        }
    }

    // 4. Nothing to render.
    VideoNarrative::default()
}

fn shape(mut highlights: Vec<Highlight>) -> Vec<Highlight> {
    highlights.truncate(TOP_HIGHLIGHTS);
    for highlight in &mut highlights {
        highlight.title = truncate_ellipsis(&highlight.title, TITLE_MAX);
    }
    highlights
}

/// The full scrolling list, one entry per commit summary.
fn scrolling_changes(summaries: &[CommitSummary]) -> Vec<String> {
    summaries
        .iter()
        .map(|s| truncate_ellipsis(s.title(), SCROLLING_MAX))
        .collect()
}

fn truncate_ellipsis(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::SummarizeError;
    use shiplog_types::{CommitInfo, RepoStats};

    /// Canned summarizer: either returns fixed highlights or always errors.
    struct Canned {
        highlights: Option<Vec<Highlight>>,
    }

    #[async_trait::async_trait]
    impl Summarizer for Canned {
        async fn summarize_commits(
            &self,
            _commits: &[CommitInfo],
        ) -> Result<Vec<CommitSummary>, SummarizeError> {
            Err(SummarizeError::EmptyResponse)
        }

        async fn summarize_overall(
            &self,
            _repo: &str,
            _window: &str,
            _stats: &RepoStats,
        ) -> Result<String, SummarizeError> {
            Err(SummarizeError::EmptyResponse)
        }

        async fn extract_highlights(
            &self,
            _text: &str,
            limit: usize,
        ) -> Result<Vec<Highlight>, SummarizeError> {
            match &self.highlights {
                Some(h) => {
                    let mut h = h.clone();
                    h.truncate(limit);
                    Ok(h)
                }
                None => Err(SummarizeError::EmptyResponse),
            }
        }
    }

    fn summaries() -> Vec<CommitSummary> {
        vec![
            CommitSummary {
                sha: "a1".into(),
                message: "feat: add websocket transport with automatic reconnect support".into(),
                additions: 90,
                deletions: 2,
                summary: "Adds a websocket transport.".into(),
            },
            CommitSummary {
                sha: "b2".into(),
                message: "fix: drop stale cache".into(),
                additions: 4,
                deletions: 9,
                summary: "Stale cache entries are dropped.".into(),
            },
        ]
    }

    fn highlight(title: &str) -> Highlight {
        Highlight {
            title: title.into(),
            description: "why it matters".into(),
        }
    }

    #[tokio::test]
    async fn manual_override_beats_richer_sources() {
        let ai = Canned {
            highlights: Some(vec![highlight("from the model")]),
        };
        let manual = VideoNarrative {
            top_highlights: vec![highlight("hand picked")],
            scrolling_changes: Vec::new(),
        };
        let derived = derive(
            &ai,
            Some(&manual),
            Some(&"long enough content ".repeat(10)),
            &summaries(),
        )
        .await;
        assert_eq!(derived.top_highlights[0].title, "hand picked");
        // Scrolling list still comes from the summaries.
        assert_eq!(derived.scrolling_changes.len(), 2);
    }

    #[tokio::test]
    async fn content_extraction_is_preferred_over_summaries() {
        let ai = Canned {
            highlights: Some(vec![highlight("extracted")]),
        };
        let content = "c".repeat(200);
        let derived = derive(&ai, None, Some(&content), &summaries()).await;
        assert_eq!(derived.top_highlights.len(), 1);
        assert_eq!(derived.top_highlights[0].title, "extracted");
    }

    #[tokio::test]
    async fn short_content_falls_through_to_summaries() {
        let ai = Canned {
            highlights: Some(vec![highlight("from summaries")]),
        };
        let derived = derive(&ai, None, Some("tiny"), &summaries()).await;
        assert_eq!(derived.top_highlights[0].title, "from summaries");
    }

    #[tokio::test]
    async fn all_sources_empty_yields_empty_narrative() {
        let ai = Canned { highlights: None };
        let derived = derive(&ai, None, None, &[]).await;
        assert!(derived.is_empty());
        assert!(derived.scrolling_changes.is_empty());
    }

    #[tokio::test]
    async fn titles_are_ellipsized_at_sixty() {
        let long = "x".repeat(90);
        let ai = Canned {
            highlights: Some(vec![highlight(&long)]),
        };
        let content = "c".repeat(200);
        let derived = derive(&ai, None, Some(&content), &summaries()).await;
        let title = &derived.top_highlights[0].title;
        assert_eq!(title.chars().count(), 60);
        assert!(title.ends_with('…'));
    }

    #[tokio::test]
    async fn scrolling_entries_are_ellipsized_at_fifty() {
        let ai = Canned {
            highlights: Some(vec![highlight("h")]),
        };
        let content = "c".repeat(200);
        let derived = derive(&ai, None, Some(&content), &summaries()).await;
        // First summary title is 62 chars, so it must be cut to 50.
        assert_eq!(derived.scrolling_changes[0].chars().count(), 50);
        assert!(derived.scrolling_changes[0].ends_with('…'));
        assert_eq!(derived.scrolling_changes[1], "fix: drop stale cache");
    }
}
