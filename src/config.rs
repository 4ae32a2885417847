use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment, File};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gateway::{Capability, KeyPool, RetryPolicy};

pub const CHAT_KEYS_VAR: &str = "OPENAI_API_KEY";
pub const SPEECH_KEYS_VAR: &str = "ELEVENLABS_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),
    #[error("{var} is not set")]
    MissingKeys { var: &'static str },
    #[error("{var} must be a JSON array of strings: {reason}")]
    MalformedKeys { var: &'static str, reason: String },
    #[error("{var} contains no usable keys")]
    EmptyKeys { var: &'static str },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ChatSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub attempt_timeout_ms: u64,
    pub rate_limit_backoff_ms: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "gemma2-9b-it".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            attempt_timeout_ms: 10_000,
            rate_limit_backoff_ms: 1000,
        }
    }
}

impl ChatSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.attempt_timeout_ms),
            Duration::from_millis(self.rate_limit_backoff_ms),
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SpeechSettings {
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub output_format: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub attempt_timeout_ms: u64,
    pub rate_limit_backoff_ms: u64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "m5qndnI7u4OAdXhH0Mr5".to_string(),
            model_id: "eleven_flash_v2_5".to_string(),
            output_format: "mp3_44100_128".to_string(),
            stability: 0.5,
            similarity_boost: 0.5,
            attempt_timeout_ms: 15_000,
            rate_limit_backoff_ms: 1000,
        }
    }
}

impl SpeechSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.attempt_timeout_ms),
            Duration::from_millis(self.rate_limit_backoff_ms),
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct InterviewSettings {
    pub duration_minutes: u32,
    pub near_end_window_ms: u64,
    pub countdown_secs: u64,
    pub max_turn_retries: u32,
    pub max_context_messages: usize,
    pub tick_interval_ms: u64,
    /// Bound on reading back a persisted log when a session resumes.
    pub resume_timeout_ms: u64,
    pub timestamp_dir: PathBuf,
}

impl Default for InterviewSettings {
    fn default() -> Self {
        Self {
            duration_minutes: 30,
            near_end_window_ms: 30_000,
            countdown_secs: 5,
            max_turn_retries: 3,
            max_context_messages: 50,
            tick_interval_ms: 1000,
            resume_timeout_ms: 10_000,
            timestamp_dir: PathBuf::from(".mockmate/timestamps"),
        }
    }
}

impl InterviewSettings {
    pub fn duration_ms(&self) -> u64 {
        u64::from(self.duration_minutes) * 60_000
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn resume_timeout(&self) -> Duration {
        Duration::from_millis(self.resume_timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AnalyticsSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    pub attempt_timeout_ms: u64,
    pub store_timeout_ms: u64,
    pub report_base_url: String,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 2000,
            attempt_timeout_ms: 45_000,
            store_timeout_ms: 10_000,
            report_base_url: "http://localhost:3000/interview/analytics".to_string(),
        }
    }
}

impl AnalyticsSettings {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Deep link to the report page for one application.
    pub fn report_url(&self, application_id: &str) -> String {
        format!(
            "{}/{}",
            self.report_base_url.trim_end_matches('/'),
            urlencoding::encode(application_id)
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("DB_PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(5432),
            name: std::env::var("DB_NAME").unwrap_or_else(|_| "mockmate_db".to_string()),
            user: std::env::var("DB_USER").unwrap_or_else(|_| "mockmate_user".to_string()),
            password: std::env::var("DB_PASSWORD").unwrap_or_default(),
        }
    }
}

impl DatabaseSettings {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct NotifySettings {
    pub webhook_url: Option<String>,
    /// Bound on awaiting delivery when a session ends.
    pub timeout_ms: u64,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self { webhook_url: None, timeout_ms: 5000 }
    }
}

impl NotifySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct AppConfig {
    pub chat: ChatSettings,
    pub speech: SpeechSettings,
    pub interview: InterviewSettings,
    pub analytics: AnalyticsSettings,
    pub database: DatabaseSettings,
    pub notify: NotifySettings,
}

impl AppConfig {
    /// Load `.env`, then `mockmate.toml` (optional), then `MOCKMATE__*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let settings = Config::builder()
            .add_source(File::with_name("mockmate").required(false))
            .add_source(
                Environment::with_prefix("MOCKMATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        info!(
            "Loaded configuration: chat model {}, speech voice {}, {} minute interviews",
            config.chat.model, config.speech.voice_id, config.interview.duration_minutes
        );
        Ok(config)
    }
}

/// Parse a key list given as a JSON array of strings. Blank entries are
/// dropped; an array with no usable key is an error.
pub fn parse_key_list(var: &'static str, raw: &str) -> Result<Vec<String>> {
    let keys: Vec<String> = serde_json::from_str(raw.trim())
        .map_err(|e| ConfigError::MalformedKeys { var, reason: e.to_string() })?;

    let keys: Vec<String> = keys
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();

    if keys.is_empty() {
        return Err(ConfigError::EmptyKeys { var });
    }
    Ok(keys)
}

fn key_list_from_env(var: &'static str) -> Result<Vec<String>> {
    let raw = std::env::var(var).map_err(|_| ConfigError::MissingKeys { var })?;
    parse_key_list(var, &raw)
}

/// Chat and speech key pools built from the environment.
#[derive(Debug)]
pub struct KeyPools {
    pub chat: KeyPool,
    pub speech: KeyPool,
}

impl KeyPools {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let chat = key_list_from_env(CHAT_KEYS_VAR)?;
        let speech = key_list_from_env(SPEECH_KEYS_VAR)?;
        info!("🔑 Loaded {} chat keys and {} speech keys", chat.len(), speech.len());
        if chat.len() == 1 {
            warn!("Only one chat key configured; rate limits will not fail over");
        }

        Ok(Self {
            chat: KeyPool::new(Capability::Chat, chat),
            speech: KeyPool::new(Capability::Speech, speech),
        })
    }
}
