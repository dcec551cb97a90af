//! Deterministic text used when the summarization provider is unavailable.
//!
//! The pipeline must reach `completed` without the provider, so both the
//! overall narrative and the per-commit lines have template versions built
//! purely from the fetched statistics.

use shiplog_types::{CommitInfo, CommitSummary, RepoStats};

/// Template overall narrative from aggregate stats.
pub fn overall_narrative(repo: &str, window: &str, stats: &RepoStats) -> String {
    let contributors = if stats.contributors.is_empty() {
        "no recorded contributors".to_owned()
    } else {
        stats.contributors.join(", ")
    };
    format!(
        "This release of {repo} covers {window}: {} commits with {} lines added \
         and {} lines removed across {} files. Contributors: {contributors}.",
        stats.commit_count, stats.stats.added, stats.stats.removed, stats.stats.modified,
    )
}

/// Template one-liner for a single commit.
pub fn commit_summary(commit: &CommitInfo) -> String {
    format!(
        "{} (+{} -{} lines)",
        commit.title(),
        commit.additions,
        commit.deletions
    )
}

/// Wrap commits in [`CommitSummary`] values carrying the template text.
pub fn commit_summaries(commits: &[CommitInfo]) -> Vec<CommitSummary> {
    commits
        .iter()
        .map(|commit| CommitSummary {
            sha: commit.sha.clone(),
            message: commit.message.clone(),
            additions: commit.additions,
            deletions: commit.deletions,
            summary: commit_summary(commit),
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use shiplog_types::ChangeStats;

    #[test]
    fn overall_narrative_carries_literal_counts_and_contributors() {
        let stats = RepoStats {
            commit_count: 4,
            stats: ChangeStats {
                added: 120,
                modified: 6,
                removed: 30,
            },
            contributors: vec!["a".into(), "b".into()],
            commits: Vec::new(),
        };
        let text = overall_narrative("acme/widget", "v1..v2", &stats);
        assert!(text.contains("120"));
        assert!(text.contains("30"));
        assert!(text.contains("a, b"));
    }
}
