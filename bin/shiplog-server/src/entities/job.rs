//! Persistence of async jobs.
//!
//! All job mutation flows through [`shiplog_types::Job::apply`] /
//! [`shiplog_types::Job::cancel`] so the terminal-guard and
//! monotonic-progress invariants hold no matter which code path writes.

use std::future::Future;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use shiplog_types::{Job, JobKind, JobStatus, JobUpdate, UpdateOutcome};

use super::{SqliteStore, decode_err, parse_ts};

/// Persistence interface for async jobs.
pub trait JobStore: Send + Sync + 'static {
    fn insert_job(&self, job: &Job) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_job(&self, id: &str)
    -> impl Future<Output = Result<Option<Job>, sqlx::Error>> + Send;

    /// Jobs newest-first, optionally filtered by kind and/or status.
    fn list_jobs(
        &self,
        kind: Option<JobKind>,
        status: Option<JobStatus>,
    ) -> impl Future<Output = Result<Vec<Job>, sqlx::Error>> + Send;

    /// Apply `update` through the job transition rules and persist the
    /// result.  Returns the job after the attempt plus what happened;
    /// `None` when the job does not exist.
    fn update_job(
        &self,
        id: &str,
        update: JobUpdate,
    ) -> impl Future<Output = Result<Option<(Job, UpdateOutcome)>, sqlx::Error>> + Send;

    /// Cooperative cancellation; the bool reports whether it took effect.
    fn cancel_job(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<(Job, bool)>, sqlx::Error>> + Send;

    /// Whether a non-terminal render job exists for `record_id`.  Checked
    /// before starting a render so at most one runs per record.
    fn has_active_render(
        &self,
        record_id: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Fail every queued/processing job left over from a previous process.
    /// Returns the number of rows touched.
    fn fail_interrupted_jobs(&self) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

impl JobStore for SqliteStore {
    async fn insert_job(&self, job: &Job) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO jobs (id, kind, status, progress, params, result, error_msg, \
             callback_url, created_at, updated_at, completed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )
        .bind(&job.id)
        .bind(job.kind.to_string())
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(job.params.to_string())
        .bind(&job.result)
        .bind(&job.error)
        .bind(&job.callback_url)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(job_from_row).transpose()
    }

    async fn list_jobs(
        &self,
        kind: Option<JobKind>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let mut sql = "SELECT * FROM jobs".to_owned();
        let mut clauses: Vec<&str> = Vec::new();
        if kind.is_some() {
            clauses.push("kind = ?");
        }
        if status.is_some() {
            clauses.push("status = ?");
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut query = sqlx::query(&sql);
        if let Some(kind) = kind {
            query = query.bind(kind.to_string());
        }
        if let Some(status) = status {
            query = query.bind(status.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(job_from_row).collect()
    }

    async fn update_job(
        &self,
        id: &str,
        update: JobUpdate,
    ) -> Result<Option<(Job, UpdateOutcome)>, sqlx::Error> {
        let Some(mut job) = self.get_job(id).await? else {
            return Ok(None);
        };
        let outcome = job.apply(update, Utc::now());
        if outcome == UpdateOutcome::Applied {
            self.write_back(&job).await?;
        }
        Ok(Some((job, outcome)))
    }

    async fn cancel_job(&self, id: &str) -> Result<Option<(Job, bool)>, sqlx::Error> {
        let Some(mut job) = self.get_job(id).await? else {
            return Ok(None);
        };
        let cancelled = job.cancel(Utc::now());
        if cancelled {
            self.write_back(&job).await?;
        }
        Ok(Some((job, cancelled)))
    }

    async fn has_active_render(&self, record_id: &str) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE kind = ?1 AND status IN (?2, ?3) \
             AND json_extract(params, '$.record_id') = ?4",
        )
        .bind(JobKind::RenderVideo.to_string())
        .bind(JobStatus::Queued.to_string())
        .bind(JobStatus::Processing.to_string())
        .bind(record_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn fail_interrupted_jobs(&self) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE jobs SET status = ?1, error_msg = 'interrupted by server restart', \
             updated_at = ?2, completed_at = ?2 WHERE status IN (?3, ?4)",
        )
        .bind(JobStatus::Failed.to_string())
        .bind(&now)
        .bind(JobStatus::Queued.to_string())
        .bind(JobStatus::Processing.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

impl SqliteStore {
    async fn write_back(&self, job: &Job) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = ?1, progress = ?2, result = ?3, error_msg = ?4, \
             updated_at = ?5, completed_at = ?6 WHERE id = ?7",
        )
        .bind(job.status.to_string())
        .bind(job.progress as i64)
        .bind(&job.result)
        .bind(&job.error)
        .bind(job.updated_at.to_rfc3339())
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .bind(&job.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn job_from_row(row: SqliteRow) -> Result<Job, sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let kind: JobKind = kind.parse().map_err(|e| decode_err("kind", e))?;

    let status: String = row.try_get("status")?;
    let status: JobStatus = status.parse().map_err(|e| decode_err("status", e))?;

    let params: String = row.try_get("params")?;
    let params: serde_json::Value =
        serde_json::from_str(&params).map_err(|e| decode_err("params", e))?;

    let progress: i64 = row.try_get("progress")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    Ok(Job {
        id: row.try_get("id")?,
        kind,
        status,
        progress: progress.clamp(0, 100) as u8,
        params,
        result: row.try_get("result")?,
        error: row.try_get("error_msg")?,
        callback_url: row.try_get("callback_url")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
        completed_at: completed_at.as_deref().map(parse_ts),
    })
}
