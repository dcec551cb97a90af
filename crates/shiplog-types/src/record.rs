//! The changelog record and its stage machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{ChangeStats, CommitSummary, RenderStatus, VideoNarrative};

/// Pipeline stage of a changelog record.
///
/// A record only ever moves forward through the fixed sequence, or jumps to
/// [`Stage::Failed`] from any non-terminal stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    FetchingStats,
    AnalyzingCommits,
    GeneratingContent,
    GeneratingVideo,
    Completed,
    Failed,
}

impl Stage {
    /// Position in the fixed forward sequence; `Failed` sits outside it.
    pub fn ordinal(self) -> usize {
        match self {
            Stage::Pending => 0,
            Stage::FetchingStats => 1,
            Stage::AnalyzingCommits => 2,
            Stage::GeneratingContent => 3,
            Stage::GeneratingVideo => 4,
            Stage::Completed => 5,
            Stage::Failed => 6,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    /// Whether a transition from `self` to `next` is legal: strictly forward
    /// through the sequence, or into `Failed` while not yet terminal.
    pub fn can_advance_to(self, next: Stage) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Stage::Failed {
            return true;
        }
        next.ordinal() > self.ordinal() && next != Stage::Failed
    }
}

/// One request to turn a repository time-window into a changelog artifact.
///
/// Content fields are written only by the pipeline; the render sub-fields
/// (`artifact_url`, `render_status`, `render_error`, `video_narrative`) may
/// additionally be rewritten by an explicitly-triggered video regeneration
/// after the record is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangelogRecord {
    pub id: String,
    /// `"owner/name"`.
    pub repository: String,
    /// Free-form range description, e.g. `"v1.2..v1.3"` or an ISO date span.
    pub window: String,
    pub stage: Stage,
    pub stage_message: String,
    pub error_msg: Option<String>,
    /// Final assembled narrative text; `None` until the content stage ran.
    pub content: Option<String>,
    pub stats: Option<ChangeStats>,
    pub contributors: Vec<String>,
    pub commit_summaries: Vec<CommitSummary>,
    pub video_narrative: Option<VideoNarrative>,
    pub artifact_url: Option<String>,
    pub render_status: Option<RenderStatus>,
    pub render_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChangelogRecord {
    /// A fresh record in `pending`, as persisted at submission time.
    pub fn new(id: String, repository: String, window: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            repository,
            window,
            stage: Stage::Pending,
            stage_message: "queued for generation".to_owned(),
            error_msg: None,
            content: None,
            stats: None,
            contributors: Vec::new(),
            commit_summaries: Vec::new(),
            video_narrative: None,
            artifact_url: None,
            render_status: None,
            render_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
