//! Destinations for emitted actions.
//!
//! The action queue calls [`ActionSink::emit`] once per threshold flush and
//! once more when it is drained at the end of an account run.

use crate::action::Action;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

/// Receives batches of actions.
#[async_trait]
pub trait ActionSink: Send + Sync {
    /// Records a batch of actions. Called with non-empty batches only.
    async fn emit(&self, actions: Vec<Action>) -> Result<()>;
}

/// Logs every action as JSON. Useful for dry runs and local inspection.
pub struct LogSink;

#[async_trait]
impl ActionSink for LogSink {
    async fn emit(&self, actions: Vec<Action>) -> Result<()> {
        for action in &actions {
            let record = serde_json::to_string(action).context("Failed to serialize action")?;
            info!(target: "hubsync::actions", action = %record, "Action");
        }
        Ok(())
    }
}

/// Posts batches of actions as a JSON array to an ingestion endpoint.
pub struct HttpSink {
    http_client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpSink {
    /// # Arguments
    /// * `base_url` - Ingestion service base URL; batches go to `{base_url}/api/actions`
    /// * `token` - Optional bearer token
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            url: format!("{}/api/actions", base_url.trim_end_matches('/')),
            token,
        }
    }
}

#[async_trait]
impl ActionSink for HttpSink {
    async fn emit(&self, actions: Vec<Action>) -> Result<()> {
        let mut request = self.http_client.post(&self.url).json(&actions);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context("Failed to send actions to ingestion endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            anyhow::bail!("Ingestion endpoint returned error status {}: {}", status, body);
        }

        info!(count = actions.len(), url = %self.url, "Published actions");
        Ok(())
    }
}
