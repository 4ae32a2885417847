use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use super::{ApplicationDirectory, ApplicationStatus, ConversationStore, InterviewTurn, Result, StoreError};

/// Process-local conversation log and application directory.
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    turns: RwLock<BTreeMap<(String, u32), InterviewTurn>>,
    statuses: RwLock<HashMap<String, ApplicationStatus>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an application with an initial status.
    pub fn with_application(self, application_id: &str, status: ApplicationStatus) -> Self {
        self.statuses.write().insert(application_id.to_string(), status);
        self
    }

    pub fn turn_count(&self, application_id: &str) -> usize {
        self.turns
            .read()
            .keys()
            .filter(|(app, _)| app == application_id)
            .count()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn append(&self, turn: &InterviewTurn) -> Result<()> {
        debug!(
            "Storing {} record #{} for {}",
            turn.entry.speaker(),
            turn.sequence,
            turn.application_id
        );
        self.turns
            .write()
            .insert((turn.application_id.clone(), turn.sequence), turn.clone());
        Ok(())
    }

    async fn list_by_application(&self, application_id: &str) -> Result<Vec<InterviewTurn>> {
        Ok(self
            .turns
            .read()
            .range((application_id.to_string(), 0)..=(application_id.to_string(), u32::MAX))
            .map(|(_, turn)| turn.clone())
            .collect())
    }
}

#[async_trait]
impl ApplicationDirectory for MemoryConversationStore {
    async fn status(&self, application_id: &str) -> Result<ApplicationStatus> {
        self.statuses
            .read()
            .get(application_id)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("application {}", application_id)))
    }

    async fn set_status(&self, application_id: &str, status: ApplicationStatus) -> Result<()> {
        self.statuses.write().insert(application_id.to_string(), status);
        Ok(())
    }
}
