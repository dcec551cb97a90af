//! Generic async jobs and their transition rules.
//!
//! A job tracks any long-running operation exposed to external callers,
//! independent of pipeline stage semantics.  All mutation goes through
//! [`Job::apply`] / [`Job::cancel`] so the terminal-guard and
//! monotonic-progress invariants hold at a single choke point regardless of
//! which store backs the job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The closed set of job kinds the dispatcher understands.
///
/// Kinds are persisted as their kebab-case strings; a row whose kind no
/// longer parses produces an explicit dispatch error rather than silently
/// succeeding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Run the full generation pipeline for one record.
    ProcessRecord,
    /// Drive the render orchestrator for one record, skipping the pipeline.
    RenderVideo,
    /// Re-derive the video narrative for one record without rendering.
    ExtractHighlights,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// A partial update to a job, as produced by a handler.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl JobUpdate {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn processing() -> Self {
        Self {
            status: Some(JobStatus::Processing),
            ..Self::default()
        }
    }

    pub fn completed(result: String) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100),
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error: Some(error),
            ..Self::default()
        }
    }
}

/// What happened when an update was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// The job was already terminal; the update was dropped without error so
    /// duplicate completion signals from concurrent paths stay harmless.
    IgnoredTerminal,
}

/// A trackable async operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 0–100; never decreases while the job is processing.
    pub progress: u8,
    /// Kind-specific parameters, e.g. `{"record_id": "...", "force": true}`.
    pub params: serde_json::Value,
    pub result: Option<String>,
    pub error: Option<String>,
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: String,
        kind: JobKind,
        params: serde_json::Value,
        callback_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            kind,
            status: JobStatus::Queued,
            progress: 0,
            params,
            result: None,
            error: None,
            callback_url,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Apply `update`, enforcing the job invariants:
    ///
    /// - updates to a terminal job are ignored, not errors;
    /// - progress is clamped to 100 and never decreases;
    /// - `completed_at` is stamped exactly once, on the first terminal
    ///   transition, together with the result or error (never both).
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> UpdateOutcome {
        if self.status.is_terminal() {
            return UpdateOutcome::IgnoredTerminal;
        }

        if let Some(progress) = update.progress {
            let progress = progress.min(100);
            if progress > self.progress {
                self.progress = progress;
            }
        }

        if let Some(status) = update.status {
            self.status = status;
            if status.is_terminal() {
                self.completed_at = Some(now);
                match status {
                    JobStatus::Completed => {
                        self.result = update.result;
                        self.error = None;
                    }
                    JobStatus::Failed => {
                        self.error = update.error.map(|e| crate::truncate_message(&e));
                        self.result = None;
                    }
                    _ => {}
                }
            }
        }

        self.updated_at = now;
        UpdateOutcome::Applied
    }

    /// Cancel the job.  Legal only from `queued`/`processing`; returns
    /// whether the cancellation took effect.  Cancellation is cooperative:
    /// in-flight work is not aborted here, but handlers re-check status
    /// before committing further updates.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = JobStatus::Cancelled;
        self.completed_at = Some(now);
        self.updated_at = now;
        true
    }
}
