use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::interview::EndReason;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
    #[error("Notification endpoint returned {0}")]
    Status(u16),
}

/// Emitted once when an interview reaches its terminal stage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    /// Unique per emitted event so receivers can drop duplicates.
    pub event_id: Uuid,
    pub application_id: String,
    pub analytics_url: String,
    pub reason: EndReason,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn interview_completed(&self, event: &CompletionEvent) -> Result<(), NotifyError>;
}

/// Writes completion events to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn interview_completed(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        info!(
            "📨 Interview completed for {} ({}): {}",
            event.application_id, event.reason, event.analytics_url
        );
        Ok(())
    }
}

/// POSTs completion events as JSON.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client, url: url.into() }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn interview_completed(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            warn!("Completion webhook returned {}", response.status());
            return Err(NotifyError::Status(response.status().as_u16()));
        }

        info!("📨 Completion webhook delivered for {}", event.application_id);
        Ok(())
    }
}
