use std::sync::Arc;

use chrono::{TimeZone, Utc};
use log::{error, info, warn};

use super::dialogue::format_dialogue;
use super::prompt::scoring_request;
use super::report::{AnalyticsReport, RawData, ScoreSheet};
use super::trends::TrendReport;
use super::{AggregationError, Result};
use crate::config::AnalyticsSettings;
use crate::gateway::ChatInvoker;
use crate::interview::{extract_json_object, Clock};
use crate::store::{list_with_timeout, ConversationStore};

/// Builds an analytics report from a persisted conversation log.
pub struct AnalyticsAggregator {
    chat: Arc<ChatInvoker>,
    store: Arc<dyn ConversationStore>,
    clock: Arc<dyn Clock>,
    settings: AnalyticsSettings,
}

impl AnalyticsAggregator {
    pub fn new(
        chat: Arc<ChatInvoker>,
        store: Arc<dyn ConversationStore>,
        clock: Arc<dyn Clock>,
        settings: AnalyticsSettings,
    ) -> Self {
        Self { chat, store, clock, settings }
    }

    pub async fn aggregate(&self, application_id: &str) -> Result<AnalyticsReport> {
        info!("📊 Aggregating analytics for {}", application_id);

        let turns = list_with_timeout(self.store.as_ref(), application_id, self.settings.store_timeout())
            .await
            .map_err(|e| {
                error!("Conversation log unavailable for {}: {}", application_id, e);
                AggregationError::StoreUnavailable(e)
            })?;

        if turns.is_empty() {
            return Err(AggregationError::NoData(application_id.to_string()));
        }

        let (dialogue, stats) = format_dialogue(&turns);
        let request = scoring_request(&dialogue, &stats, &self.settings);
        let policy = self.chat.policy().clone().with_attempt_timeout(self.settings.attempt_timeout());

        let invocation = self.chat.invoke_with(&request, None, &policy).await?;
        let raw = invocation.response.content;
        let scores = parse_score_sheet(&raw)?;

        let now_ms = self.clock.now_ms() as i64;
        let analysis_timestamp = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .unwrap_or_else(Utc::now);

        let trends = TrendReport::from_time_series(&scores.time_series);
        info!(
            "📊 Analytics for {}: overall {}, confidence trend {:?}",
            application_id, scores.overall.overall, trends.confidence.trend
        );

        Ok(AnalyticsReport {
            scores,
            trends,
            raw_data: RawData {
                application_id: application_id.to_string(),
                total_turns: stats.total_turns,
                candidate_answers: stats.candidate_answers,
                analysis_timestamp,
            },
        })
    }
}

/// Parse the model's scoring reply. The raw text is kept on failure.
pub fn parse_score_sheet(raw: &str) -> Result<ScoreSheet> {
    let invalid = |reason: String| {
        warn!("Invalid analytics output: {}", reason);
        AggregationError::InvalidModelOutput {
            reason,
            raw: raw.to_string(),
        }
    };

    let json = extract_json_object(raw).ok_or_else(|| invalid("no JSON object in reply".to_string()))?;
    let sheet: ScoreSheet = serde_json::from_str(json).map_err(|e| invalid(e.to_string()))?;
    sheet.check().map_err(invalid)?;
    Ok(sheet)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_raw_on_failure() {
        match parse_score_sheet("Sorry, I cannot score this.") {
            Err(AggregationError::InvalidModelOutput { raw, .. }) => {
                assert_eq!(raw, "Sorry, I cannot score this.");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let out_of_range = r#"{"overall":{"confidence":700,"communication":1,"technical":1,"overall":1},
            "radar":{"communication":1,"technical":1,"problemSolving":1,"confidence":1,"professionalism":1}}"#;
        assert!(matches!(
            parse_score_sheet(out_of_range),
            Err(AggregationError::InvalidModelOutput { .. })
        ));
    }
}
