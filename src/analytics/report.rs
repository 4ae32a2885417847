use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trends::TrendReport;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OverallScores {
    pub confidence: f64,
    pub communication: f64,
    pub technical: f64,
    pub overall: f64,
}

/// Five-axis breakdown, 0-100 each.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RadarScores {
    pub communication: f64,
    pub technical: f64,
    pub problem_solving: f64,
    pub confidence: f64,
    pub professionalism: f64,
}

/// Fine-grained metrics on a 0-10 scale.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DetailedMetrics {
    pub clarity: f64,
    pub grammar: f64,
    pub structure: f64,
    pub comprehension: f64,
    pub knowledge_depth: f64,
    pub practical_application: f64,
    pub learning_agility: f64,
    pub stress_handling: f64,
}

/// Per-answer sub-scores in answer order, 0-100; 0 marks an unscored answer.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeSeries {
    pub confidence: Vec<f64>,
    pub accuracy: Vec<f64>,
    pub fluency: Vec<f64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Insights {
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub hr_insight: String,
    /// One of "Strong Hire", "Hire", "No Hire", "Strong No Hire".
    pub recommendation: String,
    pub risk_factors: Vec<String>,
}

/// The model-produced part of a report.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSheet {
    pub overall: OverallScores,
    pub radar: RadarScores,
    #[serde(default)]
    pub question_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub detailed_metrics: DetailedMetrics,
    #[serde(default)]
    pub time_series: TimeSeries,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub insights: Insights,
}

fn check_range(name: &str, value: f64, max: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(format!("{} = {} is outside 0-{}", name, value, max));
    }
    Ok(())
}

impl ScoreSheet {
    /// Reject scores outside their scales.
    pub fn check(&self) -> Result<(), String> {
        let o = &self.overall;
        for (name, value) in [
            ("overall.confidence", o.confidence),
            ("overall.communication", o.communication),
            ("overall.technical", o.technical),
            ("overall.overall", o.overall),
        ] {
            check_range(name, value, 100.0)?;
        }

        let r = &self.radar;
        for (name, value) in [
            ("radar.communication", r.communication),
            ("radar.technical", r.technical),
            ("radar.problemSolving", r.problem_solving),
            ("radar.confidence", r.confidence),
            ("radar.professionalism", r.professionalism),
        ] {
            check_range(name, value, 100.0)?;
        }

        for (question, value) in &self.question_scores {
            check_range(&format!("questionScores[{}]", question), *value, 100.0)?;
        }

        let d = &self.detailed_metrics;
        for (name, value) in [
            ("detailedMetrics.clarity", d.clarity),
            ("detailedMetrics.grammar", d.grammar),
            ("detailedMetrics.structure", d.structure),
            ("detailedMetrics.comprehension", d.comprehension),
            ("detailedMetrics.knowledgeDepth", d.knowledge_depth),
            ("detailedMetrics.practicalApplication", d.practical_application),
            ("detailedMetrics.learningAgility", d.learning_agility),
            ("detailedMetrics.stressHandling", d.stress_handling),
        ] {
            check_range(name, value, 10.0)?;
        }

        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawData {
    pub application_id: String,
    pub total_turns: usize,
    pub candidate_answers: usize,
    pub analysis_timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    #[serde(flatten)]
    pub scores: ScoreSheet,
    pub trends: TrendReport,
    pub raw_data: RawData,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub overall_score: f64,
    pub recommendation: String,
    pub strengths: Vec<String>,
    pub improvement_areas: Vec<String>,
    pub risk_factors: Vec<String>,
}

impl AnalyticsReport {
    pub fn summary(&self) -> AnalyticsSummary {
        let insights = &self.scores.insights;
        let recommendation = if insights.recommendation.trim().is_empty() {
            "No recommendation".to_string()
        } else {
            insights.recommendation.clone()
        };

        AnalyticsSummary {
            overall_score: self.scores.overall.overall,
            recommendation,
            strengths: insights.strengths.clone(),
            improvement_areas: insights.improvements.clone(),
            risk_factors: insights.risk_factors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "overall": {"confidence": 70, "communication": 80, "technical": 65, "overall": 72},
        "radar": {"communication": 80, "technical": 65, "problemSolving": 60, "confidence": 70, "professionalism": 90}
    }"#;

    #[test]
    fn test_minimal_sheet_fills_defaults() {
        let sheet: ScoreSheet = serde_json::from_str(MINIMAL).unwrap();
        assert!(sheet.keywords.is_empty());
        assert!(sheet.time_series.confidence.is_empty());
        assert!(sheet.check().is_ok());
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        let mut sheet: ScoreSheet = serde_json::from_str(MINIMAL).unwrap();
        sheet.detailed_metrics.clarity = 42.0;
        assert!(sheet.check().unwrap_err().contains("detailedMetrics.clarity"));

        let mut sheet: ScoreSheet = serde_json::from_str(MINIMAL).unwrap();
        sheet.question_scores.insert("q1".into(), -3.0);
        assert!(sheet.check().is_err());
    }

    #[test]
    fn test_missing_required_block_fails() {
        assert!(serde_json::from_str::<ScoreSheet>(r#"{"overall": {"confidence": 1}}"#).is_err());
    }
}
