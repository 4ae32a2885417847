use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config, Pool, Runtime};
use log::{error, info};
use tokio_postgres::NoTls;

use super::{
    ApplicationDirectory, ApplicationStatus, ConversationStore, InterviewTurn, Result, StoreError, TurnEntry,
};
use crate::config::DatabaseSettings;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS applications (
    id TEXT PRIMARY KEY,
    status TEXT NOT NULL DEFAULT 'pending',
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS interview_turns (
    application_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    speaker TEXT NOT NULL,
    payload JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (application_id, sequence)
);
"#;

/// Conversation log and application directory backed by PostgreSQL.
#[derive(Debug)]
pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        info!(
            "Connecting to database: {}@{}:{}/{}",
            settings.user, settings.host, settings.port, settings.name
        );

        let mut cfg = Config::new();
        cfg.url = Some(settings.url());
        cfg.manager = Some(deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Unavailable(format!("Pool creation failed: {}", e)))?;

        let client = pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Connection test failed: {}", e)))?;
        client
            .batch_execute(SCHEMA)
            .await
            .map_err(|e| StoreError::Query(format!("Schema setup failed: {}", e)))?;

        info!("Database connection established successfully");
        Ok(Self { pool })
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl ConversationStore for PostgresStore {
    async fn append(&self, turn: &InterviewTurn) -> Result<()> {
        let client = self.client().await?;
        let payload = serde_json::to_value(&turn.entry)?;
        let sequence = turn.sequence as i32;

        client
            .execute(
                r#"
                INSERT INTO interview_turns (application_id, sequence, speaker, payload, created_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (application_id, sequence)
                DO UPDATE SET speaker = EXCLUDED.speaker, payload = EXCLUDED.payload
                "#,
                &[
                    &turn.application_id,
                    &sequence,
                    &turn.entry.speaker(),
                    &payload,
                    &turn.created_at,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to store turn #{} for {}: {}", turn.sequence, turn.application_id, e);
                StoreError::Query(format!("Failed to store turn: {}", e))
            })?;

        Ok(())
    }

    async fn list_by_application(&self, application_id: &str) -> Result<Vec<InterviewTurn>> {
        let client = self.client().await?;

        let rows = client
            .query(
                r#"
                SELECT sequence, payload, created_at
                FROM interview_turns
                WHERE application_id = $1
                ORDER BY sequence ASC
                "#,
                &[&application_id],
            )
            .await
            .map_err(|e| {
                error!("Failed to list turns for {}: {}", application_id, e);
                StoreError::Query(format!("Failed to list turns: {}", e))
            })?;

        rows.into_iter()
            .map(|row| {
                let sequence: i32 = row.get(0);
                let payload: serde_json::Value = row.get(1);
                let created_at: DateTime<Utc> = row.get(2);
                let entry: TurnEntry = serde_json::from_value(payload)?;
                Ok(InterviewTurn {
                    application_id: application_id.to_string(),
                    sequence: sequence.max(0) as u32,
                    entry,
                    created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ApplicationDirectory for PostgresStore {
    async fn status(&self, application_id: &str) -> Result<ApplicationStatus> {
        let client = self.client().await?;

        let row = client
            .query_opt("SELECT status FROM applications WHERE id = $1", &[&application_id])
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch application status: {}", e)))?
            .ok_or_else(|| StoreError::NotFound(format!("application {}", application_id)))?;

        let status: String = row.get(0);
        status.parse()
    }

    async fn set_status(&self, application_id: &str, status: ApplicationStatus) -> Result<()> {
        let client = self.client().await?;

        client
            .execute(
                r#"
                INSERT INTO applications (id, status, updated_at)
                VALUES ($1, $2, now())
                ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, updated_at = now()
                "#,
                &[&application_id, &status.as_str()],
            )
            .await
            .map_err(|e| {
                error!("Failed to update application status: {}", e);
                StoreError::Query(format!("Failed to update application status: {}", e))
            })?;

        info!("Application {} status updated to: {}", application_id, status);
        Ok(())
    }
}
