use serde::{Deserialize, Serialize};

use super::report::TimeSeries;

/// Points at least this far apart (second-half mean minus first-half mean)
/// count as a change.
pub const TREND_THRESHOLD: f64 = 5.0;

pub const ROLLING_WINDOW: usize = 3;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Compare the mean of the second half of `scores` with the first half.
/// An odd middle element belongs to the second half.
pub fn compute_trend(scores: &[f64]) -> Trend {
    if scores.len() < 2 {
        return Trend::InsufficientData;
    }

    let (first, second) = scores.split_at(scores.len() / 2);
    let difference = mean(second) - mean(first);

    if difference > TREND_THRESHOLD {
        Trend::Improving
    } else if difference < -TREND_THRESHOLD {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// Trailing mean over up to `window` points ending at each index.
pub fn rolling_average(scores: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..scores.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            mean(&scores[start..=i])
        })
        .collect()
}

/// Drop unscored points (non-positive or non-finite).
pub fn scored_points(series: &[f64]) -> Vec<f64> {
    series.iter().copied().filter(|v| v.is_finite() && *v > 0.0).collect()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetricTrend {
    pub trend: Trend,
    pub average: f64,
    pub rolling_average: Vec<f64>,
    pub points: usize,
}

impl MetricTrend {
    pub fn from_series(series: &[f64]) -> Self {
        let points = scored_points(series);
        Self {
            trend: compute_trend(&points),
            average: mean(&points),
            rolling_average: rolling_average(&points, ROLLING_WINDOW),
            points: points.len(),
        }
    }
}

/// Locally computed trend block of a report.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    pub confidence: MetricTrend,
    pub accuracy: MetricTrend,
    pub fluency: MetricTrend,
}

impl TrendReport {
    pub fn from_time_series(series: &TimeSeries) -> Self {
        Self {
            confidence: MetricTrend::from_series(&series.confidence),
            accuracy: MetricTrend::from_series(&series.accuracy),
            fluency: MetricTrend::from_series(&series.fluency),
        }
    }
}
