//! Repository statistics and per-commit data.

use serde::{Deserialize, Serialize};

/// Aggregate line-change counters for one changelog window.
///
/// `added` and `removed` count lines, `modified` counts files touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStats {
    pub added: u64,
    pub modified: u64,
    pub removed: u64,
}

/// One commit as reported by the stats backend, before summarization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub additions: u64,
    pub deletions: u64,
}

impl CommitInfo {
    /// Additions plus deletions, used to rank commit significance.
    pub fn churn(&self) -> u64 {
        self.additions + self.deletions
    }

    /// First line of the commit message.
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// Everything the stats backend returns for a repository + window.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoStats {
    pub commit_count: u64,
    pub stats: ChangeStats,
    /// Unique contributor logins in first-seen order.
    pub contributors: Vec<String>,
    pub commits: Vec<CommitInfo>,
}

/// A commit plus its generated (or fallback) natural-language summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub sha: String,
    pub message: String,
    pub additions: u64,
    pub deletions: u64,
    pub summary: String,
}

impl CommitSummary {
    /// First line of the commit message, used as a section heading.
    pub fn title(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn churn_adds_both_directions() {
        let c = CommitInfo {
            sha: "abc".into(),
            message: "fix".into(),
            additions: 7,
            deletions: 5,
        };
        assert_eq!(c.churn(), 12);
    }

    #[test]
    fn title_is_first_line_only() {
        let c = CommitInfo {
            sha: "abc".into(),
            message: "feat: add parser\n\nLong body here.".into(),
            additions: 0,
            deletions: 0,
        };
        assert_eq!(c.title(), "feat: add parser");
    }
}
