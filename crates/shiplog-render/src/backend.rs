//! HTTP implementation of [`RenderBackend`](crate::RenderBackend).
//!
//! Talks to a render service exposing `POST /renders` and
//! `GET /renders/{id}`.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use shiplog_types::{RenderStatus, VideoNarrative};

use crate::{RenderError, RenderHandle, RenderMeta, RenderPoll};

pub struct HttpRenderBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpRenderBackend {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("shiplog/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            token,
        }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait::async_trait]
impl crate::RenderBackend for HttpRenderBackend {
    async fn trigger(
        &self,
        narrative: &VideoNarrative,
        meta: &RenderMeta,
    ) -> Result<RenderHandle, RenderError> {
        let url = format!("{}/renders", self.base_url);
        let resp = self
            .authed(self.client.post(&url))
            .json(&serde_json::json!({
                "narrative": narrative,
                "metadata": meta,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RenderError::Trigger {
                message: format!("{status}: {body}"),
            });
        }

        let wire: WireHandle = resp.json().await?;
        debug!(render_id = %wire.id, "render triggered");
        let location = wire
            .status_url
            .unwrap_or_else(|| format!("{url}/{}", wire.id));
        Ok(RenderHandle {
            render_id: wire.id,
            location,
        })
    }

    async fn status(&self, render_id: &str) -> Result<RenderPoll, RenderError> {
        let url = format!("{}/renders/{}", self.base_url, render_id);
        let resp = self
            .authed(self.client.get(&url))
            .send()
            .await?
            .error_for_status()?;
        let wire: WireStatus = resp.json().await?;

        let status = match wire.status.as_str() {
            "queued" | "pending" => RenderStatus::Pending,
            "rendering" | "processing" => RenderStatus::Rendering,
            "succeeded" | "done" => RenderStatus::Succeeded,
            "failed" | "error" => RenderStatus::Failed,
            other => {
                return Err(RenderError::InvalidResponse {
                    message: format!("unknown render status '{other}'"),
                });
            }
        };

        Ok(RenderPoll {
            status,
            progress: wire.progress.min(100) as u8,
            artifact_url: wire.artifact_url,
            error: wire.error,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireHandle {
    id: String,
    #[serde(default)]
    status_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireStatus {
    status: String,
    #[serde(default)]
    progress: u64,
    #[serde(default)]
    artifact_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wire_status_tolerates_missing_fields() {
        let wire: WireStatus =
            serde_json::from_str(r#"{"status": "rendering", "progress": 40}"#).unwrap();
        assert_eq!(wire.status, "rendering");
        assert!(wire.artifact_url.is_none());
    }
}
