//! Repository statistics fetching.
//!
//! [`StatsFetcher`] is the boundary the pipeline sees; [`GithubStatsFetcher`]
//! is the production implementation against the GitHub REST API.

pub mod error;
pub mod github;

pub use error::StatsError;
pub use github::GithubStatsFetcher;

use shiplog_types::RepoStats;

/// Fetches commit/line-change/contributor aggregates for a repository and
/// time window.
///
/// A fetch failure is fatal to the owning pipeline run: it usually signals a
/// bad repository reference or an upstream outage, and nothing downstream
/// can proceed without the stats.
#[async_trait::async_trait]
pub trait StatsFetcher: Send + Sync {
    /// `repo` is `"owner/name"`; `window` is a ref range such as
    /// `"v1.2..v1.3"` or `"main@{2024-01-01}..main"`.
    async fn fetch(&self, repo: &str, window: &str) -> Result<RepoStats, StatsError>;
}
