use thiserror::Error;

/// Errors returned by stats fetching.
#[derive(Debug, Error)]
pub enum StatsError {
    /// An HTTP request failed at the transport level.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream API answered with a non-success status that retries did
    /// not (or must not) resolve.
    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The API response was missing an expected field or had an unexpected
    /// shape.
    #[error("invalid stats response: {message}")]
    InvalidResponse { message: String },

    /// The repository or window reference could not be parsed.
    #[error("invalid repository reference: {message}")]
    InvalidReference { message: String },
}
