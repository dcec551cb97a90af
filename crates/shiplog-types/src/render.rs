//! Render attempt state.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Pending,
    Rendering,
    Succeeded,
    Failed,
}

impl RenderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Succeeded | RenderStatus::Failed)
    }
}

/// One render attempt against the remote backend.
///
/// A record may accumulate several attempts over its life, but at most one
/// of them is non-terminal at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderState {
    /// Backend-assigned identifier for the attempt.
    pub render_id: String,
    /// Backend location reference (status URL or opaque handle).
    pub location: String,
    pub status: RenderStatus,
    pub progress: u8,
    pub error: Option<String>,
}

impl RenderState {
    pub fn rendering(render_id: String, location: String) -> Self {
        Self {
            render_id,
            location,
            status: RenderStatus::Rendering,
            progress: 0,
            error: None,
        }
    }
}
