//! GitHub REST implementation of [`StatsFetcher`](crate::StatsFetcher).
//!
//! Uses the compare API to enumerate commits and changed files for a ref
//! range, then fetches per-commit detail for line counts.  Requests that
//! fail with 5xx or 429 are retried a bounded number of times with a fixed
//! delay; 4xx responses are never retried.

use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use shiplog_types::{ChangeStats, CommitInfo, RepoStats};

use crate::error::StatsError;

/// Retry cap for 5xx/429 responses, counting the first attempt.
const RETRY_ATTEMPTS: usize = 3;
/// Delay between retry attempts.
const RETRY_DELAY: Duration = Duration::from_secs(2);
/// Per-commit detail requests are capped so one huge window cannot turn into
/// hundreds of API calls.
const MAX_DETAILED_COMMITS: usize = 50;

pub struct GithubStatsFetcher {
    client: Client,
    api_base: String,
    token: Option<String>,
}

impl GithubStatsFetcher {
    pub fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("shiplog/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_base: api_base.into(),
            token,
        }
    }

    fn get(&self, url: &str) -> RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Send `req`, retrying on 5xx/429 up to [`RETRY_ATTEMPTS`] times.
    async fn send_with_retry(&self, req: RequestBuilder) -> Result<reqwest::Response, StatsError> {
        let mut last: Option<StatsError> = None;
        for attempt in 0..RETRY_ATTEMPTS {
            let Some(req) = req.try_clone() else {
                break;
            };
            let resp = req.send().await?;
            let status = resp.status();
            if status.is_success() {
                return Ok(resp);
            }
            let message = resp.text().await.unwrap_or_default();
            if !is_retryable(status) {
                return Err(StatsError::Upstream {
                    status: status.as_u16(),
                    message,
                });
            }
            warn!(
                status = status.as_u16(),
                attempt = attempt + 1,
                "retryable upstream response"
            );
            last = Some(StatsError::Upstream {
                status: status.as_u16(),
                message,
            });
            if attempt + 1 < RETRY_ATTEMPTS {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
        Err(last.unwrap_or(StatsError::InvalidResponse {
            message: "request could not be cloned for retry".to_owned(),
        }))
    }

    async fn compare(&self, repo: &str, base: &str, head: &str) -> Result<CompareResponse, StatsError> {
        let url = format!("{}/repos/{}/compare/{}...{}", self.api_base, repo, base, head);
        let resp = self.send_with_retry(self.get(&url)).await?;
        Ok(resp.json().await?)
    }

    async fn commit_detail(&self, repo: &str, sha: &str) -> Result<CommitDetail, StatsError> {
        let url = format!("{}/repos/{}/commits/{}", self.api_base, repo, sha);
        let resp = self.send_with_retry(self.get(&url)).await?;
        Ok(resp.json().await?)
    }
}

#[async_trait::async_trait]
impl crate::StatsFetcher for GithubStatsFetcher {
    async fn fetch(&self, repo: &str, window: &str) -> Result<RepoStats, StatsError> {
        let (base, head) = parse_window(window)?;
        if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(StatsError::InvalidReference {
                message: format!("repository must be owner/name, got '{repo}'"),
            });
        }

        let compared = self.compare(repo, base, head).await?;
        debug!(
            repo,
            window,
            commits = compared.commits.len(),
            files = compared.files.len(),
            "compare fetched"
        );

        let detailed = compared.commits.len().min(MAX_DETAILED_COMMITS);
        if detailed < compared.commits.len() {
            warn!(
                repo,
                total = compared.commits.len(),
                detailed,
                "window exceeds per-commit detail cap; line counts cover newest commits only"
            );
        }

        let mut commits = Vec::with_capacity(detailed);
        for entry in compared.commits.iter().rev().take(detailed) {
            let detail = self.commit_detail(repo, &entry.sha).await?;
            commits.push(CommitInfo {
                sha: detail.sha,
                message: detail.commit.message,
                additions: detail.stats.additions,
                deletions: detail.stats.deletions,
            });
        }

        Ok(aggregate(&compared, commits))
    }
}

/// Build the final [`RepoStats`] from the compare response plus detailed
/// commits.  Aggregate line counts come from the compare file list so they
/// cover the whole window even when detail fetching was capped.
fn aggregate(compared: &CompareResponse, commits: Vec<CommitInfo>) -> RepoStats {
    let mut contributors: Vec<String> = Vec::new();
    for entry in &compared.commits {
        let login = entry
            .author
            .as_ref()
            .map(|a| a.login.clone())
            .unwrap_or_else(|| entry.commit.author_name().to_owned());
        if !login.is_empty() && !contributors.contains(&login) {
            contributors.push(login);
        }
    }

    let added = compared.files.iter().map(|f| f.additions).sum();
    let removed = compared.files.iter().map(|f| f.deletions).sum();

    RepoStats {
        commit_count: compared.commits.len() as u64,
        stats: ChangeStats {
            added,
            modified: compared.files.len() as u64,
            removed,
        },
        contributors,
        commits,
    }
}

/// Split a `"base..head"` window into its two refs.
fn parse_window(window: &str) -> Result<(&str, &str), StatsError> {
    let (base, head) = window.split_once("..").ok_or_else(|| StatsError::InvalidReference {
        message: format!("window must be 'base..head', got '{window}'"),
    })?;
    let head = head.strip_prefix('.').unwrap_or(head);
    if base.is_empty() || head.is_empty() {
        return Err(StatsError::InvalidReference {
            message: format!("window must name both refs, got '{window}'"),
        });
    }
    Ok((base, head))
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

// ── wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompareResponse {
    commits: Vec<CompareCommit>,
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct CompareCommit {
    sha: String,
    commit: CommitMeta,
    author: Option<Author>,
}

#[derive(Debug, Deserialize)]
struct CommitMeta {
    message: String,
    author: Option<GitIdent>,
}

impl CommitMeta {
    fn author_name(&self) -> &str {
        self.author.as_ref().map(|a| a.name.as_str()).unwrap_or("")
    }
}

#[derive(Debug, Deserialize)]
struct GitIdent {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Author {
    login: String,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    sha: String,
    commit: CommitMeta,
    stats: CommitStats,
}

#[derive(Debug, Deserialize)]
struct CommitStats {
    #[serde(default)]
    additions: u64,
    #[serde(default)]
    deletions: u64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn window_parses_two_and_three_dot_forms() {
        assert_eq!(parse_window("v1.2..v1.3").unwrap(), ("v1.2", "v1.3"));
        assert_eq!(parse_window("main...feature").unwrap(), ("main", "feature"));
        assert!(parse_window("just-a-ref").is_err());
        assert!(parse_window("..head").is_err());
    }

    #[test]
    fn retry_classification() {
        assert!(is_retryable(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable(StatusCode::BAD_GATEWAY));
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable(StatusCode::NOT_FOUND));
        assert!(!is_retryable(StatusCode::UNPROCESSABLE_ENTITY));
    }

    #[test]
    fn aggregate_dedups_contributors_and_sums_files() {
        let compared: CompareResponse = serde_json::from_value(serde_json::json!({
            "commits": [
                {"sha": "a1", "commit": {"message": "one", "author": {"name": "Ada"}},
                 "author": {"login": "ada"}},
                {"sha": "b2", "commit": {"message": "two", "author": {"name": "Ada"}},
                 "author": {"login": "ada"}},
                {"sha": "c3", "commit": {"message": "three", "author": {"name": "Grace H."}},
                 "author": null}
            ],
            "files": [
                {"additions": 100, "deletions": 20},
                {"additions": 20, "deletions": 10}
            ]
        }))
        .unwrap();

        let stats = aggregate(&compared, Vec::new());
        assert_eq!(stats.commit_count, 3);
        assert_eq!(stats.stats.added, 120);
        assert_eq!(stats.stats.removed, 30);
        assert_eq!(stats.stats.modified, 2);
        assert_eq!(stats.contributors, vec!["ada".to_owned(), "Grace H.".to_owned()]);
    }

    #[test]
    fn commit_detail_deserializes() {
        let detail: CommitDetail = serde_json::from_value(serde_json::json!({
            "sha": "a1",
            "commit": {"message": "feat: parser\n\nbody", "author": {"name": "Ada"}},
            "stats": {"additions": 12, "deletions": 3, "total": 15}
        }))
        .unwrap();
        assert_eq!(detail.stats.additions, 12);
        assert_eq!(detail.commit.message.lines().next().unwrap(), "feat: parser");
    }
}
