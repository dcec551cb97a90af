//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use shiplog_github::StatsFetcher;
use shiplog_narrate::Summarizer;
use shiplog_render::RenderOrchestrator;

use crate::config::Config;
use crate::entities::SqliteStore;

/// State shared across all HTTP handlers and background pipeline tasks.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Persistent record / job store.
    pub store: Arc<SqliteStore>,
    /// Repository statistics backend.
    pub stats: Arc<dyn StatsFetcher>,
    /// AI summarization backend.
    pub summarizer: Arc<dyn Summarizer>,
    /// Render orchestration over the remote media backend.
    pub renderer: Arc<RenderOrchestrator>,
    /// Shared HTTP client for webhook notifications.
    pub http: reqwest::Client,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
