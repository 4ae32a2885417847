pub mod aggregator;
pub mod dialogue;
pub mod prompt;
pub mod report;
pub mod trends;

pub use aggregator::{parse_score_sheet, AnalyticsAggregator};
pub use dialogue::{format_dialogue, DialogueStats};
pub use report::{
    AnalyticsReport, AnalyticsSummary, DetailedMetrics, Insights, OverallScores, RadarScores, RawData, ScoreSheet,
    TimeSeries,
};
pub use trends::{compute_trend, rolling_average, MetricTrend, Trend, TrendReport};

use thiserror::Error;

use crate::gateway::GatewayError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AggregationError {
    #[error("No conversation recorded for application {0}")]
    NoData(String),
    #[error("Conversation log unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("Scoring call failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("Scoring reply was not a valid score sheet: {reason}")]
    InvalidModelOutput { reason: String, raw: String },
}

pub type Result<T> = std::result::Result<T, AggregationError>;
