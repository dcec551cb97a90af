//! [`Summarizer`](crate::Summarizer) implementation on the `genai` client.

use genai::Client;
use genai::chat::{ChatMessage, ChatRequest};
use serde::Deserialize;
use tracing::debug;

use shiplog_types::{CommitInfo, CommitSummary, Highlight, RepoStats};

use crate::SummarizeError;
use crate::fallback;

const SYSTEM_PROMPT: &str = "You are a release-notes writer. Answer with exactly \
what is asked for, without preamble. When asked for JSON, emit JSON only.";

pub struct GenAiSummarizer {
    client: Client,
    model: String,
}

impl GenAiSummarizer {
    /// `model` is any identifier the `genai` client resolves, e.g.
    /// `"gpt-4o-mini"` or `"gemini-2.0-flash"`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: Client::default(),
            model: model.into(),
        }
    }

    async fn chat(&self, user_prompt: String) -> Result<String, SummarizeError> {
        let request = ChatRequest::new(vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(user_prompt),
        ]);
        let response = self.client.exec_chat(&self.model, request, None).await?;
        let text = response
            .first_text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(SummarizeError::EmptyResponse)?;
        Ok(text.to_owned())
    }
}

#[async_trait::async_trait]
impl crate::Summarizer for GenAiSummarizer {
    async fn summarize_commits(
        &self,
        commits: &[CommitInfo],
    ) -> Result<Vec<CommitSummary>, SummarizeError> {
        if commits.is_empty() {
            return Ok(Vec::new());
        }

        let mut listing = String::new();
        for commit in commits {
            listing.push_str(&format!(
                "- sha {} (+{} -{}): {}\n",
                commit.sha, commit.additions, commit.deletions, commit.title()
            ));
        }
        let prompt = format!(
            "Summarize each commit below in one plain sentence aimed at users \
             reading a changelog. Respond with a JSON array of objects \
             {{\"sha\": \"...\", \"summary\": \"...\"}}, one per commit, same order.\n\n{listing}"
        );

        let raw = self.chat(prompt).await?;
        let parsed: Vec<WireSummary> = serde_json::from_str(strip_code_fence(&raw))?;
        debug!(requested = commits.len(), received = parsed.len(), "commit summaries parsed");

        // Re-align by sha; a commit the model skipped gets the deterministic line.
        Ok(commits
            .iter()
            .map(|commit| {
                let summary = parsed
                    .iter()
                    .find(|w| w.sha == commit.sha)
                    .map(|w| w.summary.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| fallback::commit_summary(commit));
                CommitSummary {
                    sha: commit.sha.clone(),
                    message: commit.message.clone(),
                    additions: commit.additions,
                    deletions: commit.deletions,
                    summary,
                }
            })
            .collect())
    }

    async fn summarize_overall(
        &self,
        repo: &str,
        window: &str,
        stats: &RepoStats,
    ) -> Result<String, SummarizeError> {
        let titles: Vec<&str> = stats.commits.iter().map(|c| c.title()).collect();
        let prompt = format!(
            "Write a short changelog introduction (2-4 sentences, plain prose) \
             for {repo} covering {window}. {} commits, +{} -{} lines, \
             contributors: {}. Commit titles:\n{}",
            stats.commit_count,
            stats.stats.added,
            stats.stats.removed,
            stats.contributors.join(", "),
            titles.join("\n"),
        );
        self.chat(prompt).await
    }

    async fn extract_highlights(
        &self,
        text: &str,
        limit: usize,
    ) -> Result<Vec<Highlight>, SummarizeError> {
        let prompt = format!(
            "From the changelog text below, pick the {limit} most significant \
             changes. Respond with a JSON array of objects \
             {{\"title\": \"...\", \"description\": \"...\"}}, most significant \
             first, at most {limit} entries.\n\n{text}"
        );
        let raw = self.chat(prompt).await?;
        let mut highlights: Vec<Highlight> = serde_json::from_str(strip_code_fence(&raw))?;
        highlights.truncate(limit);
        Ok(highlights)
    }
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    sha: String,
    summary: String,
}

/// Models often wrap JSON answers in a Markdown code fence; strip it.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.trim_start_matches('\n')
        .strip_suffix("```")
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fence_stripping_handles_plain_and_fenced() {
        assert_eq!(strip_code_fence("[1, 2]"), "[1, 2]");
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn wire_summary_parses() {
        let parsed: Vec<WireSummary> =
            serde_json::from_str(r#"[{"sha": "a1", "summary": "Adds a parser."}]"#).unwrap();
        assert_eq!(parsed[0].sha, "a1");
    }
}
