//! The generation pipeline: one background task per changelog record.
//!
//! Stages run strictly in sequence; each stage persists its stage marker
//! *before* doing any work so an observer polling the record always sees
//! the stage currently executing.  Stats failures are fatal, summarizer
//! failures degrade to deterministic fallback text, and render failures are
//! recorded on the render sub-fields without failing the record.

use tracing::{error, info, warn};

use shiplog_github::StatsFetcher;
use shiplog_narrate::{Summarizer, content, fallback, highlights};
use shiplog_render::{RenderOptions, RenderOrchestrator, RenderOutcome};
use shiplog_types::{
    JobUpdate, RenderStatus, Stage, UpdateOutcome, truncate_message,
};

use crate::entities::{JobStore, RecordStore};

/// Commits summarized per record: the top ten by churn.
const SUMMARY_COMMITS: usize = 10;

/// How one pipeline run ended.
enum PipelineEnd {
    Completed { artifact_url: Option<String> },
    Cancelled,
    Failed(String),
}

/// Run the full pipeline for `record_id`, tracking it on job `job_id`.
///
/// Never panics and never returns an error to the spawner: every outcome,
/// including persistence failure, ends up on the record/job rows (best
/// effort) and in the logs.
pub async fn run<S>(
    store: &S,
    stats_fetcher: &dyn StatsFetcher,
    summarizer: &dyn Summarizer,
    renderer: &RenderOrchestrator,
    record_id: &str,
    job_id: &str,
) where
    S: RecordStore + JobStore,
{
    match drive(store, stats_fetcher, summarizer, renderer, record_id, job_id).await {
        Ok(PipelineEnd::Completed { artifact_url }) => {
            let result = serde_json::json!({
                "record_id": record_id,
                "artifact_url": artifact_url,
            })
            .to_string();
            if let Err(e) = store.update_job(job_id, JobUpdate::completed(result)).await {
                error!(job_id, error = %e, "failed to persist job completion");
            }
            info!(record_id, "changelog generation completed");
        }
        Ok(PipelineEnd::Cancelled) => {
            // The job is already terminal; only the record needs a resting
            // state.
            if let Err(e) = store.fail_record(record_id, "generation cancelled by caller").await {
                error!(record_id, error = %e, "failed to persist cancellation");
            }
            info!(record_id, "changelog generation cancelled");
        }
        Ok(PipelineEnd::Failed(message)) => {
            let message = truncate_message(&message);
            warn!(record_id, message = %message, "changelog generation failed");
            if let Err(e) = store.fail_record(record_id, &message).await {
                error!(record_id, error = %e, "failed to persist record failure");
            }
            if let Err(e) = store.update_job(job_id, JobUpdate::failed(message)).await {
                error!(job_id, error = %e, "failed to persist job failure");
            }
        }
        Err(e) => {
            // Persistence is down; there is no safe fallback.  Surface what
            // we can.
            error!(record_id, error = %e, "pipeline aborted on persistence error");
            let message = truncate_message(&format!("persistence error: {e}"));
            let _ = store.fail_record(record_id, &message).await;
            let _ = store.update_job(job_id, JobUpdate::failed(message)).await;
        }
    }
}

async fn drive<S>(
    store: &S,
    stats_fetcher: &dyn StatsFetcher,
    summarizer: &dyn Summarizer,
    renderer: &RenderOrchestrator,
    record_id: &str,
    job_id: &str,
) -> Result<PipelineEnd, sqlx::Error>
where
    S: RecordStore + JobStore,
{
    let Some(record) = store.get_record(record_id).await? else {
        return Ok(PipelineEnd::Failed(format!("record {record_id} not found")));
    };

    // Claim the job; a cancellation that raced submission wins here.
    match store.update_job(job_id, JobUpdate::processing()).await? {
        Some((_, UpdateOutcome::Applied)) => {}
        _ => return Ok(PipelineEnd::Cancelled),
    }

    // ── fetching_stats ────────────────────────────────────────────────────────
    store
        .set_stage(record_id, Stage::FetchingStats, "fetching repository statistics")
        .await?;
    let repo_stats = match stats_fetcher.fetch(&record.repository, &record.window).await {
        Ok(stats) => stats,
        // A stats failure usually means a bad repository reference or an
        // upstream outage; nothing downstream can run without it.
        Err(e) => return Ok(PipelineEnd::Failed(format!("stats fetch failed: {e}"))),
    };
    store
        .set_stats(record_id, &repo_stats.stats, &repo_stats.contributors)
        .await?;
    store.update_job(job_id, JobUpdate::progress(25)).await?;
    if cancelled(store, job_id).await? {
        return Ok(PipelineEnd::Cancelled);
    }

    // ── analyzing_commits ─────────────────────────────────────────────────────
    store
        .set_stage(record_id, Stage::AnalyzingCommits, "summarizing significant commits")
        .await?;
    let mut ranked = repo_stats.commits.clone();
    ranked.sort_by(|a, b| b.churn().cmp(&a.churn()));
    ranked.truncate(SUMMARY_COMMITS);

    let summaries = match summarizer.summarize_commits(&ranked).await {
        Ok(summaries) => summaries,
        Err(e) => {
            warn!(record_id, error = %e, "commit summarization degraded to template");
            fallback::commit_summaries(&ranked)
        }
    };
    let overall = match summarizer
        .summarize_overall(&record.repository, &record.window, &repo_stats)
        .await
    {
        Ok(overall) => overall,
        Err(e) => {
            warn!(record_id, error = %e, "overall narrative degraded to template");
            fallback::overall_narrative(&record.repository, &record.window, &repo_stats)
        }
    };
    store.set_summaries(record_id, &summaries).await?;
    store.update_job(job_id, JobUpdate::progress(50)).await?;
    if cancelled(store, job_id).await? {
        return Ok(PipelineEnd::Cancelled);
    }

    // ── generating_content ────────────────────────────────────────────────────
    store
        .set_stage(record_id, Stage::GeneratingContent, "assembling changelog text")
        .await?;
    let assembled = content::assemble(&overall, &summaries);
    store.set_content(record_id, &assembled).await?;
    store.update_job(job_id, JobUpdate::progress(70)).await?;
    if cancelled(store, job_id).await? {
        return Ok(PipelineEnd::Cancelled);
    }

    // ── generating_video ──────────────────────────────────────────────────────
    store
        .set_stage(record_id, Stage::GeneratingVideo, "deriving video narrative")
        .await?;
    let narrative = highlights::derive(
        summarizer,
        record.video_narrative.as_ref(),
        Some(&assembled),
        &summaries,
    )
    .await;

    let mut artifact_url = None;
    if narrative.is_empty() {
        info!(record_id, "no highlights available; skipping video");
    } else {
        store.set_video_narrative(record_id, &narrative).await?;
        match renderer
            .run(&record, &narrative, RenderOptions { reuse_existing: true, force: false })
            .await
        {
            Ok(RenderOutcome::Reused { artifact_url: url })
            | Ok(RenderOutcome::Completed { artifact_url: url, .. }) => {
                store
                    .set_render_result(record_id, RenderStatus::Succeeded, Some(&url), None)
                    .await?;
                artifact_url = Some(url);
            }
            // Video is best-effort: record the failure on the render
            // sub-fields and keep going.
            Err(e) => {
                let message = truncate_message(&e.to_string());
                warn!(record_id, error = %message, "render failed; record completes without video");
                store
                    .set_render_result(record_id, RenderStatus::Failed, None, Some(&message))
                    .await?;
            }
        }
    }
    store.update_job(job_id, JobUpdate::progress(90)).await?;

    // ── completed ─────────────────────────────────────────────────────────────
    store
        .set_stage(record_id, Stage::Completed, "changelog ready")
        .await?;
    Ok(PipelineEnd::Completed { artifact_url })
}

/// Cooperative cancellation check between stages.
async fn cancelled<S: JobStore>(store: &S, job_id: &str) -> Result<bool, sqlx::Error> {
    Ok(store
        .get_job(job_id)
        .await?
        .is_some_and(|job| job.status == shiplog_types::JobStatus::Cancelled))
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use shiplog_github::StatsError;
    use shiplog_narrate::SummarizeError;
    use shiplog_render::{RenderBackend, RenderError, RenderHandle, RenderMeta, RenderPoll};
    use shiplog_types::{
        ChangeStats, ChangelogRecord, CommitInfo, CommitSummary, Highlight, Job, JobKind,
        JobStatus, RepoStats, VideoNarrative,
    };

    // ── in-memory store ───────────────────────────────────────────────────────

    #[derive(Default)]
    struct Inner {
        records: HashMap<String, ChangelogRecord>,
        jobs: HashMap<String, Job>,
        stage_log: Vec<Stage>,
    }

    #[derive(Default)]
    struct MemStore {
        inner: Mutex<Inner>,
    }

    impl MemStore {
        fn with_record_and_job() -> (Self, String, String) {
            let store = Self::default();
            let record = ChangelogRecord::new(
                "r1".into(),
                "acme/widget".into(),
                "v1..v2".into(),
                Utc::now(),
            );
            let job = Job::new(
                "j1".into(),
                JobKind::ProcessRecord,
                serde_json::json!({"record_id": "r1"}),
                None,
                Utc::now(),
            );
            {
                let mut inner = store.inner.lock().unwrap();
                inner.records.insert(record.id.clone(), record);
                inner.jobs.insert(job.id.clone(), job);
            }
            (store, "r1".into(), "j1".into())
        }

        fn record(&self, id: &str) -> ChangelogRecord {
            self.inner.lock().unwrap().records.get(id).unwrap().clone()
        }

        fn job(&self, id: &str) -> Job {
            self.inner.lock().unwrap().jobs.get(id).unwrap().clone()
        }

        fn stages(&self) -> Vec<Stage> {
            self.inner.lock().unwrap().stage_log.clone()
        }
    }

    impl RecordStore for MemStore {
        async fn insert_record(&self, record: &ChangelogRecord) -> Result<(), sqlx::Error> {
            self.inner
                .lock()
                .unwrap()
                .records
                .insert(record.id.clone(), record.clone());
            Ok(())
        }

        async fn get_record(&self, id: &str) -> Result<Option<ChangelogRecord>, sqlx::Error> {
            Ok(self.inner.lock().unwrap().records.get(id).cloned())
        }

        async fn list_records(&self) -> Result<Vec<ChangelogRecord>, sqlx::Error> {
            Ok(self.inner.lock().unwrap().records.values().cloned().collect())
        }

        async fn set_stage(
            &self,
            id: &str,
            stage: Stage,
            message: &str,
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            inner.stage_log.push(stage);
            if let Some(record) = inner.records.get_mut(id) {
                record.stage = stage;
                record.stage_message = message.to_owned();
            }
            Ok(())
        }

        async fn fail_record(&self, id: &str, message: &str) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            inner.stage_log.push(Stage::Failed);
            if let Some(record) = inner.records.get_mut(id) {
                record.stage = Stage::Failed;
                record.error_msg = Some(message.to_owned());
            }
            Ok(())
        }

        async fn set_stats(
            &self,
            id: &str,
            stats: &ChangeStats,
            contributors: &[String],
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(record) = inner.records.get_mut(id) {
                record.stats = Some(*stats);
                record.contributors = contributors.to_vec();
            }
            Ok(())
        }

        async fn set_summaries(
            &self,
            id: &str,
            summaries: &[CommitSummary],
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(record) = inner.records.get_mut(id) {
                record.commit_summaries = summaries.to_vec();
            }
            Ok(())
        }

        async fn set_content(&self, id: &str, content: &str) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(record) = inner.records.get_mut(id) {
                record.content = Some(content.to_owned());
            }
            Ok(())
        }

        async fn set_video_narrative(
            &self,
            id: &str,
            narrative: &VideoNarrative,
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(record) = inner.records.get_mut(id) {
                record.video_narrative = Some(narrative.clone());
            }
            Ok(())
        }

        async fn set_render_result(
            &self,
            id: &str,
            status: RenderStatus,
            artifact_url: Option<&str>,
            error: Option<&str>,
        ) -> Result<(), sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            if let Some(record) = inner.records.get_mut(id) {
                record.render_status = Some(status);
                record.artifact_url = artifact_url.map(str::to_owned);
                record.render_error = error.map(str::to_owned);
            }
            Ok(())
        }
    }

    impl JobStore for MemStore {
        async fn insert_job(&self, job: &Job) -> Result<(), sqlx::Error> {
            self.inner.lock().unwrap().jobs.insert(job.id.clone(), job.clone());
            Ok(())
        }

        async fn get_job(&self, id: &str) -> Result<Option<Job>, sqlx::Error> {
            Ok(self.inner.lock().unwrap().jobs.get(id).cloned())
        }

        async fn list_jobs(
            &self,
            _kind: Option<JobKind>,
            _status: Option<JobStatus>,
        ) -> Result<Vec<Job>, sqlx::Error> {
            Ok(self.inner.lock().unwrap().jobs.values().cloned().collect())
        }

        async fn update_job(
            &self,
            id: &str,
            update: JobUpdate,
        ) -> Result<Option<(Job, UpdateOutcome)>, sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(id) else {
                return Ok(None);
            };
            let outcome = job.apply(update, Utc::now());
            Ok(Some((job.clone(), outcome)))
        }

        async fn cancel_job(&self, id: &str) -> Result<Option<(Job, bool)>, sqlx::Error> {
            let mut inner = self.inner.lock().unwrap();
            let Some(job) = inner.jobs.get_mut(id) else {
                return Ok(None);
            };
            let cancelled = job.cancel(Utc::now());
            Ok(Some((job.clone(), cancelled)))
        }

        async fn has_active_render(&self, _record_id: &str) -> Result<bool, sqlx::Error> {
            Ok(false)
        }

        async fn fail_interrupted_jobs(&self) -> Result<u64, sqlx::Error> {
            Ok(0)
        }
    }

    // ── scripted collaborators ────────────────────────────────────────────────

    struct ScriptedStats {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ScriptedStats {
        fn ok() -> Self {
            Self { calls: AtomicUsize::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), fail: true }
        }
    }

    #[async_trait::async_trait]
    impl StatsFetcher for ScriptedStats {
        async fn fetch(&self, _repo: &str, _window: &str) -> Result<RepoStats, StatsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(StatsError::Upstream {
                    status: 502,
                    message: "github is down".into(),
                });
            }
            Ok(RepoStats {
                commit_count: 2,
                stats: ChangeStats { added: 120, modified: 5, removed: 30 },
                contributors: vec!["a".into(), "b".into()],
                commits: vec![
                    CommitInfo {
                        sha: "a1".into(),
                        message: "feat: bigger change".into(),
                        additions: 100,
                        deletions: 20,
                    },
                    CommitInfo {
                        sha: "b2".into(),
                        message: "fix: smaller change".into(),
                        additions: 20,
                        deletions: 10,
                    },
                ],
            })
        }
    }

    /// Summarizer that either works or always errors.
    struct ScriptedSummarizer {
        down: bool,
    }

    #[async_trait::async_trait]
    impl Summarizer for ScriptedSummarizer {
        async fn summarize_commits(
            &self,
            commits: &[CommitInfo],
        ) -> Result<Vec<CommitSummary>, SummarizeError> {
            if self.down {
                return Err(SummarizeError::EmptyResponse);
            }
            Ok(commits
                .iter()
                .map(|c| CommitSummary {
                    sha: c.sha.clone(),
                    message: c.message.clone(),
                    additions: c.additions,
                    deletions: c.deletions,
                    summary: format!("summary of {}", c.sha),
                })
                .collect())
        }

        async fn summarize_overall(
            &self,
            repo: &str,
            _window: &str,
            _stats: &RepoStats,
        ) -> Result<String, SummarizeError> {
            if self.down {
                return Err(SummarizeError::EmptyResponse);
            }
            Ok(format!("A fine release of {repo}."))
        }

        async fn extract_highlights(
            &self,
            _text: &str,
            _limit: usize,
        ) -> Result<Vec<Highlight>, SummarizeError> {
            if self.down {
                return Err(SummarizeError::EmptyResponse);
            }
            Ok(vec![Highlight {
                title: "Bigger change".into(),
                description: "The headline of this release.".into(),
            }])
        }
    }

    /// Render backend that succeeds on the second poll, never finishes, or
    /// fails the trigger, depending on the mode.
    enum RenderMode {
        Succeed,
        NeverFinish,
    }

    struct ScriptedRender {
        mode: RenderMode,
        triggers: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RenderBackend for ScriptedRender {
        async fn trigger(
            &self,
            _narrative: &VideoNarrative,
            _meta: &RenderMeta,
        ) -> Result<RenderHandle, RenderError> {
            self.triggers.fetch_add(1, Ordering::SeqCst);
            Ok(RenderHandle { render_id: "rd-1".into(), location: "/renders/rd-1".into() })
        }

        async fn status(&self, _render_id: &str) -> Result<RenderPoll, RenderError> {
            match self.mode {
                RenderMode::Succeed => Ok(RenderPoll {
                    status: RenderStatus::Succeeded,
                    progress: 100,
                    artifact_url: Some("https://media.example/r1.mp4".into()),
                    error: None,
                }),
                RenderMode::NeverFinish => Ok(RenderPoll {
                    status: RenderStatus::Rendering,
                    progress: 50,
                    artifact_url: None,
                    error: None,
                }),
            }
        }
    }

    fn renderer(mode: RenderMode) -> RenderOrchestrator {
        RenderOrchestrator::new(ScriptedRender { mode, triggers: AtomicUsize::new(0) })
            .with_polling(3, std::time::Duration::from_millis(0))
    }

    // ── the tests ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn happy_path_walks_every_stage_in_order() {
        let (store, record_id, job_id) = MemStore::with_record_and_job();
        run(
            &store,
            &ScriptedStats::ok(),
            &ScriptedSummarizer { down: false },
            &renderer(RenderMode::Succeed),
            &record_id,
            &job_id,
        )
        .await;

        assert_eq!(
            store.stages(),
            vec![
                Stage::FetchingStats,
                Stage::AnalyzingCommits,
                Stage::GeneratingContent,
                Stage::GeneratingVideo,
                Stage::Completed,
            ]
        );
        let record = store.record(&record_id);
        assert_eq!(record.stage, Stage::Completed);
        assert_eq!(record.artifact_url.as_deref(), Some("https://media.example/r1.mp4"));
        assert_eq!(record.render_status, Some(RenderStatus::Succeeded));
        let job = store.job(&job_id);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn summarizer_outage_degrades_but_completes() {
        let (store, record_id, job_id) = MemStore::with_record_and_job();
        run(
            &store,
            &ScriptedStats::ok(),
            &ScriptedSummarizer { down: true },
            &renderer(RenderMode::Succeed),
            &record_id,
            &job_id,
        )
        .await;

        let record = store.record(&record_id);
        assert_eq!(record.stage, Stage::Completed);
        // Template content carries the literal aggregates and contributors.
        let content = record.content.unwrap();
        assert!(content.contains("120"));
        assert!(content.contains("30"));
        assert!(content.contains("a, b"));
        assert!(record.error_msg.is_none());
        // Highlight extraction also failed, so the video stage was skipped.
        assert!(record.artifact_url.is_none());
        assert!(record.render_status.is_none());
        assert_eq!(store.job(&job_id).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn stats_failure_is_fatal() {
        let (store, record_id, job_id) = MemStore::with_record_and_job();
        run(
            &store,
            &ScriptedStats::failing(),
            &ScriptedSummarizer { down: false },
            &renderer(RenderMode::Succeed),
            &record_id,
            &job_id,
        )
        .await;

        let record = store.record(&record_id);
        assert_eq!(record.stage, Stage::Failed);
        assert!(record.error_msg.unwrap().contains("stats fetch failed"));
        assert!(record.content.is_none());
        assert_eq!(store.job(&job_id).status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn render_timeout_leaves_record_completed() {
        let (store, record_id, job_id) = MemStore::with_record_and_job();
        run(
            &store,
            &ScriptedStats::ok(),
            &ScriptedSummarizer { down: false },
            &renderer(RenderMode::NeverFinish),
            &record_id,
            &job_id,
        )
        .await;

        let record = store.record(&record_id);
        assert_eq!(record.stage, Stage::Completed);
        assert!(record.artifact_url.is_none());
        assert_eq!(record.render_status, Some(RenderStatus::Failed));
        assert!(!record.render_error.unwrap().is_empty());
        assert_eq!(store.job(&job_id).status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancellation_before_start_skips_all_work() {
        let (store, record_id, job_id) = MemStore::with_record_and_job();
        store.cancel_job(&job_id).await.unwrap();

        let stats = ScriptedStats::ok();
        run(
            &store,
            &stats,
            &ScriptedSummarizer { down: false },
            &renderer(RenderMode::Succeed),
            &record_id,
            &job_id,
        )
        .await;

        assert_eq!(stats.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.job(&job_id).status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn fatal_error_messages_are_bounded() {
        let (store, record_id, job_id) = MemStore::with_record_and_job();

        struct NoisyStats;
        #[async_trait::async_trait]
        impl StatsFetcher for NoisyStats {
            async fn fetch(&self, _r: &str, _w: &str) -> Result<RepoStats, StatsError> {
                Err(StatsError::Upstream { status: 500, message: "x".repeat(5000) })
            }
        }

        run(
            &store,
            &NoisyStats,
            &ScriptedSummarizer { down: false },
            &renderer(RenderMode::Succeed),
            &record_id,
            &job_id,
        )
        .await;

        let record = store.record(&record_id);
        assert!(record.error_msg.unwrap().chars().count() <= shiplog_types::ERROR_MESSAGE_MAX);
    }
}
