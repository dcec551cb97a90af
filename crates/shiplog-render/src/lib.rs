//! Video-render orchestration.
//!
//! [`RenderBackend`] is the boundary to the remote service that turns a
//! narrative into an encoded media file; [`orchestrator::RenderOrchestrator`]
//! drives it: artifact reuse, trigger, and a bounded poll loop that can
//! never hang.

pub mod backend;
pub mod error;
pub mod orchestrator;

pub use backend::HttpRenderBackend;
pub use error::RenderError;
pub use orchestrator::{RenderOptions, RenderOrchestrator, RenderOutcome};

use serde::{Deserialize, Serialize};

use shiplog_types::{RenderStatus, VideoNarrative};

/// Context the render backend receives alongside the narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderMeta {
    pub record_id: String,
    pub repository: String,
    pub window: String,
}

/// What a successful trigger hands back: enough to poll the attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderHandle {
    pub render_id: String,
    /// Backend location reference (status URL or opaque handle).
    pub location: String,
}

/// One status observation of an in-flight render.
#[derive(Debug, Clone)]
pub struct RenderPoll {
    pub status: RenderStatus,
    pub progress: u8,
    pub artifact_url: Option<String>,
    pub error: Option<String>,
}

/// The remote render service, reduced to trigger + status.
#[async_trait::async_trait]
pub trait RenderBackend: Send + Sync {
    /// Start a render and return without waiting for completion.
    async fn trigger(
        &self,
        narrative: &VideoNarrative,
        meta: &RenderMeta,
    ) -> Result<RenderHandle, RenderError>;

    /// Observe the current state of a render attempt.
    async fn status(&self, render_id: &str) -> Result<RenderPoll, RenderError>;
}
