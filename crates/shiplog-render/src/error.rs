use thiserror::Error;

/// Errors from the render path.
///
/// All of them are fatal to the render attempt (and its job) but never to
/// the changelog record that owns it: video is a best-effort enhancement.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The backend rejected or failed the trigger call.
    #[error("render trigger failed: {message}")]
    Trigger { message: String },

    /// A status or trigger HTTP round-trip failed at the transport level.
    #[error("render backend request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend reported the render as failed.
    #[error("render failed: {message}")]
    Failed { message: String },

    /// The poll loop exhausted its attempt budget without a terminal status.
    #[error("render did not finish within {attempts} polls")]
    Timeout { attempts: usize },

    /// The backend answered with an unexpected payload.
    #[error("invalid render backend response: {message}")]
    InvalidResponse { message: String },
}
