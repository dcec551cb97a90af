//! Generic job endpoints: list, inspect, cancel.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use shiplog_types::{Job, JobKind, JobStatus};

use crate::entities::JobStore;
use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

#[derive(Debug, Deserialize)]
pub struct JobFilterQuery {
    /// Job kind, e.g. `"render-video"`.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Job status, e.g. `"processing"`.
    pub status: Option<String>,
}

/// List jobs newest-first (`GET /v1/jobs?type=&status=`).
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobFilterQuery>,
) -> Result<Json<Vec<Job>>, ServerError> {
    let kind = query
        .kind
        .as_deref()
        .map(|raw| {
            raw.parse::<JobKind>()
                .map_err(|_| ServerError::BadRequest(format!("unknown job type '{raw}'")))
        })
        .transpose()?;
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            raw.parse::<JobStatus>()
                .map_err(|_| ServerError::BadRequest(format!("unknown job status '{raw}'")))
        })
        .transpose()?;

    Ok(Json(state.store.list_jobs(kind, status).await?))
}

/// Fetch one job (`GET /v1/jobs/{id}`).
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ServerError> {
    let job = state
        .store
        .get_job(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("job {id} not found")))?;
    Ok(Json(job))
}

/// Cancel a job (`POST /v1/jobs/{id}/cancel`).
///
/// Legal only from `queued`/`processing`.  Cancellation is cooperative:
/// in-flight external calls are not aborted, but handlers check job status
/// before committing further progress.
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Job>, ServerError> {
    let (job, cancelled) = state
        .store
        .cancel_job(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("job {id} not found")))?;
    if !cancelled {
        return Err(ServerError::BadRequest(format!(
            "job is not cancellable from status '{}'",
            job.status
        )));
    }
    info!(job_id = %job.id, "job cancelled");
    Ok(Json(job))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn filter_query_accepts_known_values() {
        assert!("render-video".parse::<JobKind>().is_ok());
        assert!("processing".parse::<JobStatus>().is_ok());
        assert!("transcode".parse::<JobKind>().is_err());
    }
}
