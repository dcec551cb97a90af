use thiserror::Error;

/// Errors returned by summarization.
///
/// These are recoverable by design: the pipeline degrades to deterministic
/// fallback text instead of failing the record.
#[derive(Debug, Error)]
pub enum SummarizeError {
    /// The model provider call failed.
    #[error("provider error: {0}")]
    Provider(#[from] genai::Error),

    /// The provider answered, but with no usable text.
    #[error("provider returned an empty response")]
    EmptyResponse,

    /// The provider's structured answer did not parse as expected.
    #[error("malformed provider response: {0}")]
    Malformed(#[from] serde_json::Error),
}
