//! Changelog record endpoints.
//!
//! Submission is fire-and-forget: the record and its tracking job are
//! persisted, a background task is spawned, and the caller polls
//! `GET /v1/changelogs/{id}` (or the job) for progress.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use shiplog_types::{ChangelogRecord, Job, JobKind, Stage};

use crate::entities::{JobStore, RecordStore};
use crate::error::ServerError;
use crate::jobs;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/changelogs", post(submit).get(list))
        .route("/changelogs/{id}", get(get_record))
        .route("/changelogs/{id}/video", post(regenerate_video))
        .route("/changelogs/{id}/highlights", post(extract_highlights))
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    /// `"owner/name"`.
    pub repository: String,
    /// Ref range, e.g. `"v1.2..v1.3"`.
    pub window: String,
    /// Optional webhook for job completion.
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub record_id: String,
    pub job_id: String,
}

/// Submit a generation request (`POST /v1/changelogs`).
///
/// Validates inputs, persists the `pending` record plus its tracking job,
/// then returns immediately; the pipeline continues on a background task.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, ServerError> {
    if req.repository.split('/').filter(|s| !s.is_empty()).count() != 2 {
        return Err(ServerError::BadRequest(
            "repository must be 'owner/name'".into(),
        ));
    }
    if !req.window.contains("..") {
        return Err(ServerError::BadRequest(
            "window must be a ref range like 'v1.2..v1.3'".into(),
        ));
    }

    let now = Utc::now();
    let record = ChangelogRecord::new(
        Uuid::new_v4().to_string(),
        req.repository.clone(),
        req.window.clone(),
        now,
    );
    let job = Job::new(
        Uuid::new_v4().to_string(),
        JobKind::ProcessRecord,
        serde_json::json!({ "record_id": record.id }),
        req.callback_url,
        now,
    );

    state.store.insert_record(&record).await?;
    state.store.insert_job(&job).await?;

    info!(record_id = %record.id, job_id = %job.id, repository = %record.repository, "generation submitted");

    let response = SubmitResponse {
        record_id: record.id,
        job_id: job.id.clone(),
    };
    jobs::spawn((*state).clone(), job);
    Ok(Json(response))
}

/// Fetch one record (`GET /v1/changelogs/{id}`).
pub async fn get_record(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChangelogRecord>, ServerError> {
    let record = state
        .store
        .get_record(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("changelog {id} not found")))?;
    Ok(Json(record))
}

/// List records newest-first (`GET /v1/changelogs`).
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ChangelogRecord>>, ServerError> {
    Ok(Json(state.store.list_records().await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegenerateRequest {
    /// Render even when a prior artifact exists.
    #[serde(default)]
    pub force: bool,
    pub callback_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegenerateResponse {
    pub job_id: String,
}

/// Regenerate only the video (`POST /v1/changelogs/{id}/video`).
///
/// Decoupled from the full pipeline: stats and summarization never re-run.
/// Refused while another render for the same record is in flight.
pub async fn regenerate_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RegenerateRequest>,
) -> Result<Json<RegenerateResponse>, ServerError> {
    let record = state
        .store
        .get_record(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("changelog {id} not found")))?;
    if record.stage != Stage::Completed {
        return Err(ServerError::BadRequest(
            "record has not completed generation".into(),
        ));
    }
    if state.store.has_active_render(&id).await? {
        return Err(ServerError::Conflict(
            "a render is already in flight for this record".into(),
        ));
    }

    let job = Job::new(
        Uuid::new_v4().to_string(),
        JobKind::RenderVideo,
        serde_json::json!({
            "record_id": record.id,
            "force": req.force,
            "reuse_existing": true,
        }),
        req.callback_url,
        Utc::now(),
    );
    state.store.insert_job(&job).await?;

    info!(record_id = %record.id, job_id = %job.id, force = req.force, "video regeneration submitted");

    let response = RegenerateResponse { job_id: job.id.clone() };
    jobs::spawn((*state).clone(), job);
    Ok(Json(response))
}

/// Re-derive highlights without rendering (`POST /v1/changelogs/{id}/highlights`).
///
/// Useful after hand-editing the changelog text: the stored narrative is
/// refreshed so the next render picks it up.
pub async fn extract_highlights(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RegenerateResponse>, ServerError> {
    let record = state
        .store
        .get_record(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("changelog {id} not found")))?;

    let job = Job::new(
        Uuid::new_v4().to_string(),
        JobKind::ExtractHighlights,
        serde_json::json!({ "record_id": record.id }),
        None,
        Utc::now(),
    );
    state.store.insert_job(&job).await?;

    info!(record_id = %record.id, job_id = %job.id, "highlight extraction submitted");

    let response = RegenerateResponse { job_id: job.id.clone() };
    jobs::spawn((*state).clone(), job);
    Ok(Json(response))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn submit_request_parses_without_callback() {
        let req: SubmitRequest = serde_json::from_str(
            r#"{"repository": "acme/widget", "window": "v1..v2"}"#,
        )
        .unwrap();
        assert!(req.callback_url.is_none());
    }

    #[test]
    fn regenerate_force_defaults_to_false() {
        let req: RegenerateRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.force);
    }
}
