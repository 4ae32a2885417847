use std::sync::Arc;

use log::info;

pub mod analytics;
pub mod config;
pub mod gateway;
pub mod interview;
pub mod notify;
pub mod store;

pub use analytics::{AggregationError, AnalyticsAggregator, AnalyticsReport, AnalyticsSummary, Trend};
pub use config::{AppConfig, ConfigError, KeyPools};
pub use gateway::{Capability, ChatInvoker, GatewayError, ResilientInvoker, SpeechInvoker};
pub use interview::{EndReason, InterviewProfile, InterviewSession, SessionDeps, SessionOptions, Stage, TurnOutcome};
pub use notify::{CompletionEvent, LogNotifier, Notifier, WebhookNotifier};
pub use store::{ApplicationStatus, ConversationStore, InterviewTurn, MemoryConversationStore, PostgresStore};

use gateway::{ChatClient, SpeechClient};

/// Chat and speech invokers sharing process-wide key pools.
#[derive(Clone)]
pub struct Gateways {
    pub chat: Arc<ChatInvoker>,
    pub speech: Arc<SpeechInvoker>,
}

impl Gateways {
    pub fn new(config: &AppConfig, pools: KeyPools) -> Self {
        let chat: ChatInvoker = ResilientInvoker::new(
            Arc::new(ChatClient::from_settings(&config.chat)),
            Arc::new(pools.chat),
            config.chat.retry_policy(),
        );
        let speech: SpeechInvoker = ResilientInvoker::new(
            Arc::new(SpeechClient::from_settings(&config.speech)),
            Arc::new(pools.speech),
            config.speech.retry_policy(),
        );

        info!(
            "🔌 Gateways ready: {} chat keys, {} speech keys",
            chat.pool().len(),
            speech.pool().len()
        );
        Self {
            chat: Arc::new(chat),
            speech: Arc::new(speech),
        }
    }

    /// Build from `.env`, `mockmate.toml` and the environment.
    pub fn from_env(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config, KeyPools::from_env()?))
    }
}

/// Notifier selected by configuration: webhook when a URL is set, log otherwise.
pub fn notifier_from_config(config: &AppConfig) -> Arc<dyn Notifier> {
    match config.notify.webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Arc::new(WebhookNotifier::new(url)),
        _ => Arc::new(LogNotifier),
    }
}
