//! Shared domain types for the shiplog workspace.
//!
//! Everything that crosses a crate boundary lives here: the changelog record
//! and its stage machine, commit statistics, the video narrative, async jobs,
//! and render attempt state.  Status and stage enums carry their transition
//! rules as methods so every writer goes through the same checks.

pub mod job;
pub mod narrative;
pub mod record;
pub mod render;
pub mod stats;

pub use job::{Job, JobKind, JobStatus, JobUpdate, UpdateOutcome};
pub use narrative::{Highlight, VideoNarrative};
pub use record::{ChangelogRecord, Stage};
pub use render::{RenderState, RenderStatus};
pub use stats::{ChangeStats, CommitInfo, CommitSummary, RepoStats};

/// Hard cap applied to every persisted error message.
pub const ERROR_MESSAGE_MAX: usize = 500;

/// Truncate `message` to [`ERROR_MESSAGE_MAX`] characters.
///
/// Operates on character boundaries so multi-byte input never produces an
/// invalid slice.
pub fn truncate_message(message: &str) -> String {
    if message.chars().count() <= ERROR_MESSAGE_MAX {
        return message.to_owned();
    }
    message.chars().take(ERROR_MESSAGE_MAX).collect()
}
