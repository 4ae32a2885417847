pub mod memory;
pub mod postgres;

pub use memory::MemoryConversationStore;
pub use postgres::PostgresStore;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store query timed out after {0:?}")]
    Timeout(Duration),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Lifecycle status of a job application, owned outside the interview core.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
    InProgress,
    Completed,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::InProgress => "in_progress",
            ApplicationStatus::Completed => "completed",
            ApplicationStatus::Rejected => "rejected",
        }
    }

    /// No interview may run once an application is completed or rejected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApplicationStatus::Completed | ApplicationStatus::Rejected)
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ApplicationStatus::Pending),
            "accepted" => Ok(ApplicationStatus::Accepted),
            "in_progress" | "in-progress" => Ok(ApplicationStatus::InProgress),
            "completed" => Ok(ApplicationStatus::Completed),
            "rejected" => Ok(ApplicationStatus::Rejected),
            other => Err(StoreError::Query(format!("unknown application status '{}'", other))),
        }
    }
}

/// Interviewer side of an exchange, in the wire shape the model produces.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewerResponse {
    #[serde(rename = "aiResponse")]
    pub text: String,
    #[serde(default)]
    pub is_editor_question: bool,
    #[serde(default)]
    pub is_ended: bool,
    /// Locally generated instead of parsed from the model.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_fallback: bool,
}

impl InterviewerResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_editor_question: false,
            is_ended: false,
            is_fallback: false,
        }
    }

    pub fn fallback(text: impl Into<String>) -> Self {
        Self { is_fallback: true, ..Self::new(text) }
    }
}

/// Candidate side of an exchange, in the shape sent to the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateResponse {
    #[serde(rename = "candidateResponse")]
    pub text: String,
    #[serde(default)]
    pub near_end: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "speaker", rename_all = "snake_case")]
pub enum TurnEntry {
    Interviewer(InterviewerResponse),
    Candidate(CandidateResponse),
}

impl TurnEntry {
    pub fn speaker(&self) -> &'static str {
        match self {
            TurnEntry::Interviewer(_) => "interviewer",
            TurnEntry::Candidate(_) => "candidate",
        }
    }

    pub fn text(&self) -> &str {
        match self {
            TurnEntry::Interviewer(r) => &r.text,
            TurnEntry::Candidate(r) => &r.text,
        }
    }
}

/// One persisted record of the conversation log. Records are keyed by
/// `(application_id, sequence)`; an interviewer record always precedes the
/// candidate record answering it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewTurn {
    pub application_id: String,
    pub sequence: u32,
    pub entry: TurnEntry,
    pub created_at: DateTime<Utc>,
}

impl InterviewTurn {
    pub fn interviewer(application_id: &str, sequence: u32, response: InterviewerResponse) -> Self {
        Self {
            application_id: application_id.to_string(),
            sequence,
            entry: TurnEntry::Interviewer(response),
            created_at: Utc::now(),
        }
    }

    pub fn candidate(application_id: &str, sequence: u32, response: CandidateResponse) -> Self {
        Self {
            application_id: application_id.to_string(),
            sequence,
            entry: TurnEntry::Candidate(response),
            created_at: Utc::now(),
        }
    }
}

/// Append-only conversation log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Write one record. Re-appending the same `(application_id, sequence)`
    /// replaces the earlier record.
    async fn append(&self, turn: &InterviewTurn) -> Result<()>;

    /// All records for an application ordered by sequence.
    async fn list_by_application(&self, application_id: &str) -> Result<Vec<InterviewTurn>>;
}

/// `list_by_application` bounded by `timeout`.
pub async fn list_with_timeout(
    store: &dyn ConversationStore,
    application_id: &str,
    timeout: Duration,
) -> Result<Vec<InterviewTurn>> {
    match tokio::time::timeout(timeout, store.list_by_application(application_id)).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}

/// Externally owned application records.
#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    async fn status(&self, application_id: &str) -> Result<ApplicationStatus>;

    async fn set_status(&self, application_id: &str, status: ApplicationStatus) -> Result<()>;
}
