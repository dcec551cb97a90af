//! Job dispatch and webhook notification.
//!
//! One routing function maps a job's kind to its handler; every handler
//! drives job state exclusively through the store so the transition rules
//! apply uniformly.  After a handler returns, a single best-effort webhook
//! fires if the job ended in `completed`/`failed` and a callback URL is set.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, info, warn};

use shiplog_narrate::highlights;
use shiplog_render::{RenderOptions, RenderOutcome};
use shiplog_types::{
    Job, JobKind, JobStatus, JobUpdate, RenderStatus, Stage, UpdateOutcome, truncate_message,
};

use crate::entities::{JobStore, RecordStore};
use crate::pipeline;
use crate::state::AppState;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Spawn `job` on a background task.  The caller has already persisted it.
pub fn spawn(state: AppState, job: Job) {
    tokio::spawn(async move {
        let job_id = job.id.clone();
        dispatch(&state, job).await;
        notify_if_terminal(&state, &job_id).await;
    });
}

/// Route a job to its handler by kind.
///
/// The kind set is closed; a row whose kind string no longer parses never
/// reaches this point (the store rejects it with a decode error), so every
/// reachable kind has a handler.
async fn dispatch(state: &AppState, job: Job) {
    info!(job_id = %job.id, kind = %job.kind, "job dispatched");
    match job.kind {
        JobKind::ProcessRecord => {
            let Some(record_id) = record_id_param(&job) else {
                fail_job(state, &job.id, "missing record_id parameter").await;
                return;
            };
            pipeline::run(
                &*state.store,
                &*state.stats,
                &*state.summarizer,
                &state.renderer,
                &record_id,
                &job.id,
            )
            .await;
        }
        JobKind::RenderVideo => render_video(state, &job).await,
        JobKind::ExtractHighlights => extract_highlights(state, &job).await,
    }
}

#[derive(Debug, Deserialize)]
struct RenderParams {
    record_id: String,
    #[serde(default)]
    force: bool,
    #[serde(default = "default_reuse")]
    reuse_existing: bool,
}

fn default_reuse() -> bool {
    true
}

/// Standalone video regeneration: drives exactly the render orchestrator,
/// never the stats/summarization stages.
async fn render_video(state: &AppState, job: &Job) {
    let params: RenderParams = match serde_json::from_value(job.params.clone()) {
        Ok(params) => params,
        Err(e) => {
            fail_job(state, &job.id, &format!("invalid render params: {e}")).await;
            return;
        }
    };

    if !claim(state, &job.id).await {
        return;
    }

    let record = match state.store.get_record(&params.record_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            fail_job(state, &job.id, &format!("record {} not found", params.record_id)).await;
            return;
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "record load failed");
            fail_job(state, &job.id, "persistence error").await;
            return;
        }
    };
    if record.stage != Stage::Completed {
        fail_job(state, &job.id, "record has not completed generation").await;
        return;
    }

    // The stored narrative counts as the manual override when present: it
    // may carry caller edits and must win over re-extraction.
    let narrative = highlights::derive(
        &*state.summarizer,
        record.video_narrative.as_ref(),
        record.content.as_deref(),
        &record.commit_summaries,
    )
    .await;
    if narrative.is_empty() {
        fail_job(state, &job.id, "record has nothing to render").await;
        return;
    }
    let _ = state.store.update_job(&job.id, JobUpdate::progress(30)).await;
    if job_cancelled(state, &job.id).await {
        return;
    }
    if let Err(e) = state.store.set_video_narrative(&record.id, &narrative).await {
        error!(job_id = %job.id, error = %e, "failed to persist narrative");
    }

    let options = RenderOptions {
        reuse_existing: params.reuse_existing,
        force: params.force,
    };
    match state.renderer.run(&record, &narrative, options).await {
        Ok(outcome) => {
            let (artifact_url, reused) = match outcome {
                RenderOutcome::Reused { artifact_url } => (artifact_url, true),
                RenderOutcome::Completed { artifact_url, .. } => (artifact_url, false),
            };
            if let Err(e) = state
                .store
                .set_render_result(&record.id, RenderStatus::Succeeded, Some(&artifact_url), None)
                .await
            {
                error!(job_id = %job.id, error = %e, "failed to persist render result");
            }
            let result = serde_json::json!({
                "record_id": record.id,
                "artifact_url": artifact_url,
                "reused": reused,
            })
            .to_string();
            let _ = state.store.update_job(&job.id, JobUpdate::completed(result)).await;
            info!(job_id = %job.id, record_id = %record.id, reused, "render job completed");
        }
        Err(e) => {
            let message = truncate_message(&e.to_string());
            warn!(job_id = %job.id, error = %message, "render job failed");
            if let Err(e) = state
                .store
                .set_render_result(&record.id, RenderStatus::Failed, None, Some(&message))
                .await
            {
                error!(job_id = %job.id, error = %e, "failed to persist render failure");
            }
            fail_job(state, &job.id, &message).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct HighlightParams {
    record_id: String,
}

/// Re-derive the video narrative for a record without rendering anything.
async fn extract_highlights(state: &AppState, job: &Job) {
    let params: HighlightParams = match serde_json::from_value(job.params.clone()) {
        Ok(params) => params,
        Err(e) => {
            fail_job(state, &job.id, &format!("invalid highlight params: {e}")).await;
            return;
        }
    };

    if !claim(state, &job.id).await {
        return;
    }

    let record = match state.store.get_record(&params.record_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            fail_job(state, &job.id, &format!("record {} not found", params.record_id)).await;
            return;
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "record load failed");
            fail_job(state, &job.id, "persistence error").await;
            return;
        }
    };

    let narrative = highlights::derive(
        &*state.summarizer,
        record.video_narrative.as_ref(),
        record.content.as_deref(),
        &record.commit_summaries,
    )
    .await;
    if narrative.is_empty() {
        fail_job(state, &job.id, "record has no source material for highlights").await;
        return;
    }

    if let Err(e) = state.store.set_video_narrative(&record.id, &narrative).await {
        error!(job_id = %job.id, error = %e, "failed to persist narrative");
        fail_job(state, &job.id, "persistence error").await;
        return;
    }
    let result = serde_json::to_string(&narrative).unwrap_or_default();
    let _ = state.store.update_job(&job.id, JobUpdate::completed(result)).await;
    info!(job_id = %job.id, record_id = %record.id, "highlight extraction completed");
}

// ── shared helpers ────────────────────────────────────────────────────────────

fn record_id_param(job: &Job) -> Option<String> {
    job.params
        .get("record_id")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

/// Move the job to `processing`; false means it was cancelled (or gone)
/// before any work started.
async fn claim(state: &AppState, job_id: &str) -> bool {
    matches!(
        state.store.update_job(job_id, JobUpdate::processing()).await,
        Ok(Some((_, UpdateOutcome::Applied)))
    )
}

async fn job_cancelled(state: &AppState, job_id: &str) -> bool {
    matches!(
        state.store.get_job(job_id).await,
        Ok(Some(job)) if job.status == JobStatus::Cancelled
    )
}

async fn fail_job(state: &AppState, job_id: &str, message: &str) {
    warn!(job_id, message, "job failed");
    if let Err(e) = state
        .store
        .update_job(job_id, JobUpdate::failed(message.to_owned()))
        .await
    {
        error!(job_id, error = %e, "failed to persist job failure");
    }
}

/// Fire the single best-effort webhook for a terminal job.
///
/// Only `completed` and `failed` notify; delivery failures are logged and
/// never retried, and never touch job state.
pub async fn notify_if_terminal(state: &AppState, job_id: &str) {
    let job = match state.store.get_job(job_id).await {
        Ok(Some(job)) => job,
        _ => return,
    };
    if !matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
        return;
    }
    let Some(callback_url) = job.callback_url.clone() else {
        return;
    };

    let mut envelope = serde_json::json!({
        "jobId": job.id,
        "type": job.kind.to_string(),
        "status": job.status.to_string(),
        "completedAt": job.completed_at.map(|t| t.to_rfc3339()),
    });
    match job.status {
        JobStatus::Completed => envelope["result"] = job.result.clone().into(),
        JobStatus::Failed => envelope["error"] = job.error.clone().into(),
        _ => {}
    }

    match state
        .http
        .post(&callback_url)
        .json(&envelope)
        .timeout(WEBHOOK_TIMEOUT)
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => {
            debug!(job_id = %job.id, url = %callback_url, "webhook delivered");
        }
        Ok(resp) => {
            warn!(job_id = %job.id, status = resp.status().as_u16(), "webhook rejected");
        }
        Err(e) => {
            warn!(job_id = %job.id, error = %e, "webhook delivery failed");
        }
    }
}
