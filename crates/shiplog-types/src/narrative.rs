//! Video narrative types.

use serde::{Deserialize, Serialize};

/// One entry in the top-highlights reel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub title: String,
    pub description: String,
}

/// The material a video render is driven from: a short highlight reel plus a
/// full scrolling list of changes.
///
/// Always derived (or accepted verbatim as a manual override), never
/// assembled ad hoc inside the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoNarrative {
    /// At most three entries.
    pub top_highlights: Vec<Highlight>,
    pub scrolling_changes: Vec<String>,
}

impl VideoNarrative {
    /// A narrative with no highlights has nothing to render.
    pub fn is_empty(&self) -> bool {
        self.top_highlights.is_empty()
    }
}
