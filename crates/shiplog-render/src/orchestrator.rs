//! The render orchestrator: artifact reuse, trigger, bounded polling.

use std::time::Duration;

use tracing::{debug, info, warn};

use shiplog_types::{ChangelogRecord, RenderState, RenderStatus, VideoNarrative, truncate_message};

use crate::{RenderBackend, RenderError, RenderMeta};

/// Poll budget: 60 attempts at 5-second intervals, a five-minute ceiling.
const POLL_ATTEMPTS: usize = 60;
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Caller choices for one render request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Return a prior successful artifact instead of rendering again.
    pub reuse_existing: bool,
    /// Render even when a prior artifact exists.
    pub force: bool,
}

/// How a render request ended.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    /// A prior artifact was valid; the backend was never called.
    Reused { artifact_url: String },
    /// A fresh render ran to completion.
    Completed {
        artifact_url: String,
        state: RenderState,
    },
}

pub struct RenderOrchestrator {
    backend: Box<dyn RenderBackend>,
    poll_attempts: usize,
    poll_interval: Duration,
}

impl RenderOrchestrator {
    pub fn new(backend: impl RenderBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            poll_attempts: POLL_ATTEMPTS,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the poll budget.  Intended for tests; production uses the
    /// fixed five-minute ceiling.
    pub fn with_polling(mut self, attempts: usize, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    /// Run one render request for `record` to its conclusion.
    ///
    /// The reuse short-circuit comes first: with `reuse_existing` set, a
    /// prior successful artifact, and no `force`, the cached reference is
    /// returned with zero backend calls.  Otherwise the backend is
    /// triggered and polled to a terminal status within the bounded window.
    pub async fn run(
        &self,
        record: &ChangelogRecord,
        narrative: &VideoNarrative,
        options: RenderOptions,
    ) -> Result<RenderOutcome, RenderError> {
        if options.reuse_existing && !options.force {
            if let Some(artifact_url) = existing_artifact(record) {
                info!(record_id = %record.id, "reusing existing render artifact");
                return Ok(RenderOutcome::Reused {
                    artifact_url: artifact_url.to_owned(),
                });
            }
        }

        let meta = RenderMeta {
            record_id: record.id.clone(),
            repository: record.repository.clone(),
            window: record.window.clone(),
        };
        let mut state = self.start(narrative, &meta).await?;
        let artifact_url = self.await_completion(&mut state).await?;
        Ok(RenderOutcome::Completed {
            artifact_url,
            state,
        })
    }

    /// Trigger the backend and return the fresh attempt in `rendering`,
    /// without waiting for completion.
    pub async fn start(
        &self,
        narrative: &VideoNarrative,
        meta: &RenderMeta,
    ) -> Result<RenderState, RenderError> {
        let handle = self.backend.trigger(narrative, meta).await?;
        Ok(RenderState::rendering(handle.render_id, handle.location))
    }

    /// Poll `state` until the backend reports a terminal status.
    ///
    /// The loop is strictly bounded: exhausting the attempt budget yields
    /// [`RenderError::Timeout`], never an indefinite hang.
    pub async fn await_completion(&self, state: &mut RenderState) -> Result<String, RenderError> {
        for attempt in 1..=self.poll_attempts {
            let poll = self.backend.status(&state.render_id).await?;
            state.status = poll.status;
            if poll.progress > state.progress {
                state.progress = poll.progress;
            }
            debug!(
                render_id = %state.render_id,
                attempt,
                status = %poll.status,
                progress = poll.progress,
                "render polled"
            );

            match poll.status {
                RenderStatus::Succeeded => {
                    let artifact_url =
                        poll.artifact_url
                            .ok_or_else(|| RenderError::InvalidResponse {
                                message: "succeeded render carried no artifact url".to_owned(),
                            })?;
                    state.progress = 100;
                    return Ok(artifact_url);
                }
                RenderStatus::Failed => {
                    let message = truncate_message(
                        poll.error.as_deref().unwrap_or("render backend reported failure"),
                    );
                    state.error = Some(message.clone());
                    return Err(RenderError::Failed { message });
                }
                RenderStatus::Pending | RenderStatus::Rendering => {
                    if attempt < self.poll_attempts {
                        tokio::time::sleep(self.poll_interval).await;
                    }
                }
            }
        }

        warn!(render_id = %state.render_id, attempts = self.poll_attempts, "render poll budget exhausted");
        state.status = RenderStatus::Failed;
        state.error = Some(format!(
            "render did not finish within {} polls",
            self.poll_attempts
        ));
        Err(RenderError::Timeout {
            attempts: self.poll_attempts,
        })
    }
}

/// A reusable artifact: the record has a URL and its last render succeeded.
fn existing_artifact(record: &ChangelogRecord) -> Option<&str> {
    match (record.artifact_url.as_deref(), record.render_status) {
        (Some(url), Some(RenderStatus::Succeeded)) => Some(url),
        _ => None,
    }
}
