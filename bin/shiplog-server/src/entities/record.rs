//! Persistence of changelog records.

use std::future::Future;

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use shiplog_types::{
    ChangeStats, ChangelogRecord, CommitSummary, RenderStatus, Stage, VideoNarrative,
};

use super::{SqliteStore, decode_err, parse_ts};

/// Persistence interface for changelog records.
///
/// Content fields are written once per stage boundary by the pipeline; the
/// render sub-fields additionally by the video-regeneration path.
pub trait RecordStore: Send + Sync + 'static {
    fn insert_record(
        &self,
        record: &ChangelogRecord,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn get_record(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ChangelogRecord>, sqlx::Error>> + Send;

    /// All records, newest first.
    fn list_records(
        &self,
    ) -> impl Future<Output = Result<Vec<ChangelogRecord>, sqlx::Error>> + Send;

    /// Persist the stage now being entered, before its work runs, so an
    /// observer always sees the stage currently executing.
    fn set_stage(
        &self,
        id: &str,
        stage: Stage,
        message: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Move the record to `failed` with a bounded error message.
    fn fail_record(
        &self,
        id: &str,
        message: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_stats(
        &self,
        id: &str,
        stats: &ChangeStats,
        contributors: &[String],
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_summaries(
        &self,
        id: &str,
        summaries: &[CommitSummary],
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_content(
        &self,
        id: &str,
        content: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn set_video_narrative(
        &self,
        id: &str,
        narrative: &VideoNarrative,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Record the outcome of a render attempt on the owning record.
    fn set_render_result(
        &self,
        id: &str,
        status: RenderStatus,
        artifact_url: Option<&str>,
        error: Option<&str>,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;
}

impl RecordStore for SqliteStore {
    async fn insert_record(&self, record: &ChangelogRecord) -> Result<(), sqlx::Error> {
        let contributors = serde_json::to_string(&record.contributors)
            .map_err(|e| decode_err("contributors", e))?;
        let summaries = serde_json::to_string(&record.commit_summaries)
            .map_err(|e| decode_err("commit_summaries", e))?;
        sqlx::query(
            "INSERT INTO changelogs (id, repository, window, stage, stage_message, \
             contributors, commit_summaries, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&record.id)
        .bind(&record.repository)
        .bind(&record.window)
        .bind(record.stage.to_string())
        .bind(&record.stage_message)
        .bind(&contributors)
        .bind(&summaries)
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<ChangelogRecord>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM changelogs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(record_from_row).transpose()
    }

    async fn list_records(&self) -> Result<Vec<ChangelogRecord>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM changelogs ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(record_from_row).collect()
    }

    async fn set_stage(&self, id: &str, stage: Stage, message: &str) -> Result<(), sqlx::Error> {
        if !self.stage_transition_ok(id, stage).await? {
            return Ok(());
        }
        sqlx::query(
            "UPDATE changelogs SET stage = ?1, stage_message = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(stage.to_string())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail_record(&self, id: &str, message: &str) -> Result<(), sqlx::Error> {
        if !self.stage_transition_ok(id, Stage::Failed).await? {
            return Ok(());
        }
        sqlx::query(
            "UPDATE changelogs SET stage = ?1, stage_message = ?2, error_msg = ?3, \
             updated_at = ?4 WHERE id = ?5",
        )
        .bind(Stage::Failed.to_string())
        .bind("generation failed")
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_stats(
        &self,
        id: &str,
        stats: &ChangeStats,
        contributors: &[String],
    ) -> Result<(), sqlx::Error> {
        let contributors =
            serde_json::to_string(contributors).map_err(|e| decode_err("contributors", e))?;
        sqlx::query(
            "UPDATE changelogs SET lines_added = ?1, files_modified = ?2, lines_removed = ?3, \
             contributors = ?4, updated_at = ?5 WHERE id = ?6",
        )
        .bind(stats.added as i64)
        .bind(stats.modified as i64)
        .bind(stats.removed as i64)
        .bind(&contributors)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_summaries(&self, id: &str, summaries: &[CommitSummary]) -> Result<(), sqlx::Error> {
        let summaries =
            serde_json::to_string(summaries).map_err(|e| decode_err("commit_summaries", e))?;
        sqlx::query(
            "UPDATE changelogs SET commit_summaries = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(&summaries)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_content(&self, id: &str, content: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE changelogs SET content = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(content)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_video_narrative(
        &self,
        id: &str,
        narrative: &VideoNarrative,
    ) -> Result<(), sqlx::Error> {
        let narrative =
            serde_json::to_string(narrative).map_err(|e| decode_err("video_narrative", e))?;
        sqlx::query("UPDATE changelogs SET video_narrative = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(&narrative)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_render_result(
        &self,
        id: &str,
        status: RenderStatus,
        artifact_url: Option<&str>,
        error: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE changelogs SET render_status = ?1, artifact_url = ?2, render_error = ?3, \
             updated_at = ?4 WHERE id = ?5",
        )
        .bind(status.to_string())
        .bind(artifact_url)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

impl SqliteStore {
    /// Stage writes respect the record state machine: strictly forward, or
    /// into `failed` while live.  An illegal transition is dropped with a
    /// warning rather than corrupting a terminal record.
    async fn stage_transition_ok(&self, id: &str, next: Stage) -> Result<bool, sqlx::Error> {
        let current: Option<String> =
            sqlx::query_scalar("SELECT stage FROM changelogs WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        let Some(current) = current else {
            return Ok(false);
        };
        let current: Stage = current.parse().map_err(|e| decode_err("stage", e))?;
        if !current.can_advance_to(next) {
            tracing::warn!(record_id = %id, %current, %next, "illegal stage transition dropped");
            return Ok(false);
        }
        Ok(true)
    }
}

/// Rebuild a [`ChangelogRecord`] from its row, rejecting malformed JSON or
/// enum columns with an explicit decode error.
fn record_from_row(row: SqliteRow) -> Result<ChangelogRecord, sqlx::Error> {
    let stage: String = row.try_get("stage")?;
    let stage: Stage = stage.parse().map_err(|e| decode_err("stage", e))?;

    let contributors: String = row.try_get("contributors")?;
    let contributors: Vec<String> =
        serde_json::from_str(&contributors).map_err(|e| decode_err("contributors", e))?;

    let summaries: String = row.try_get("commit_summaries")?;
    let commit_summaries: Vec<CommitSummary> =
        serde_json::from_str(&summaries).map_err(|e| decode_err("commit_summaries", e))?;

    let video_narrative: Option<String> = row.try_get("video_narrative")?;
    let video_narrative: Option<VideoNarrative> = video_narrative
        .map(|raw| serde_json::from_str(&raw).map_err(|e| decode_err("video_narrative", e)))
        .transpose()?;

    let render_status: Option<String> = row.try_get("render_status")?;
    let render_status: Option<RenderStatus> = render_status
        .map(|raw| raw.parse().map_err(|e| decode_err("render_status", e)))
        .transpose()?;

    let stats = match (
        row.try_get::<Option<i64>, _>("lines_added")?,
        row.try_get::<Option<i64>, _>("files_modified")?,
        row.try_get::<Option<i64>, _>("lines_removed")?,
    ) {
        (Some(added), Some(modified), Some(removed)) => Some(ChangeStats {
            added: added.max(0) as u64,
            modified: modified.max(0) as u64,
            removed: removed.max(0) as u64,
        }),
        _ => None,
    };

    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(ChangelogRecord {
        id: row.try_get("id")?,
        repository: row.try_get("repository")?,
        window: row.try_get("window")?,
        stage,
        stage_message: row.try_get("stage_message")?,
        error_msg: row.try_get("error_msg")?,
        content: row.try_get("content")?,
        stats,
        contributors,
        commit_summaries,
        video_narrative,
        artifact_url: row.try_get("artifact_url")?,
        render_status,
        render_error: row.try_get("render_error")?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}
