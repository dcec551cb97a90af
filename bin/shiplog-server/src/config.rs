//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for shiplog-server.
///
/// Every field has a default so the server works out-of-the-box; only the
/// external-service credentials genuinely need to be set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite (or other sqlx-compatible) database URL
    /// (default: `"sqlite://shiplog.db"`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// GitHub API base URL; point at a mock in tests.
    pub github_api: String,

    /// Optional GitHub bearer token for private repositories / higher rate
    /// limits.
    pub github_token: Option<String>,

    /// Model identifier handed to the `genai` client.
    pub model: String,

    /// Base URL of the remote render backend.
    pub render_url: String,

    /// Optional bearer token for the render backend.
    pub render_token: Option<String>,

    /// Comma-separated CORS origin allow-list; wildcard when unset.
    pub cors_allowed_origins: Option<String>,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("SHIPLOG_BIND", "0.0.0.0:3000"),
            database_url: env_or("SHIPLOG_DATABASE_URL", "sqlite://shiplog.db"),
            log_level: env_or("SHIPLOG_LOG", "info"),
            log_json: std::env::var("SHIPLOG_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            github_api: env_or("SHIPLOG_GITHUB_API", "https://api.github.com"),
            github_token: std::env::var("SHIPLOG_GITHUB_TOKEN").ok(),
            model: env_or("SHIPLOG_MODEL", "gpt-4o-mini"),
            render_url: env_or("SHIPLOG_RENDER_URL", "http://localhost:9800"),
            render_token: std::env::var("SHIPLOG_RENDER_TOKEN").ok(),
            cors_allowed_origins: std::env::var("SHIPLOG_CORS_ORIGINS").ok(),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
