//! Health score calculator.
//!
//! Pure functions from a stats summary to a single weighted composite
//! score in [0, 1], a qualitative level, and improvement advice. Score
//! computation must never block report generation: a non-finite result
//! is replaced by a neutral 0.5 and logged.

use tracing::warn;

use crate::types::{AlertStats, PredictionStats};

/// Weight of the accuracy penalty (points off a 100 baseline).
const ACCURACY_WEIGHT: f64 = 40.0;
/// Weight of the anomaly-rate penalty.
const ANOMALY_WEIGHT: f64 = 35.0;
/// Weight of the alert-load penalty.
const ALERT_WEIGHT: f64 = 25.0;
/// Weighted alert load that saturates the alert penalty: 10 criticals.
const ALERT_SATURATION: f64 = 30.0;

/// Qualitative health level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthLevel {
    pub fn label(&self) -> &'static str {
        match self {
            HealthLevel::Excellent => "Excellent",
            HealthLevel::Good => "Good",
            HealthLevel::Fair => "Fair",
            HealthLevel::Poor => "Poor",
            HealthLevel::Critical => "Critical",
        }
    }
}

/// Weighted composite health score in [0, 1], rounded to 4 decimals.
///
/// Starts at 100 points and subtracts three independent penalties:
/// - accuracy: `(1 - accuracy_rate) * 40` — an empty window carries
///   accuracy 0 and takes the full 40 points, so "no data" never looks
///   healthy
/// - anomaly: `anomaly_rate * 35`
/// - alerts: `min(1, (critical*3 + warning*1.5 + info*0.5) / 30) * 25`
pub fn health_score(predictions: &PredictionStats, alerts: &AlertStats) -> f64 {
    let accuracy_penalty = (1.0 - predictions.accuracy_rate.clamp(0.0, 1.0)) * ACCURACY_WEIGHT;
    let anomaly_penalty = predictions.anomaly_rate() * ANOMALY_WEIGHT;

    let alert_load =
        alerts.critical as f64 * 3.0 + alerts.warning as f64 * 1.5 + alerts.info as f64 * 0.5;
    let alert_penalty = (alert_load / ALERT_SATURATION).min(1.0) * ALERT_WEIGHT;

    let score = (100.0 - accuracy_penalty - anomaly_penalty - alert_penalty).clamp(0.0, 100.0);
    let normalized = (score / 100.0 * 10_000.0).round() / 10_000.0;

    if !normalized.is_finite() {
        warn!("Health score computation produced a non-finite value, using neutral 0.5");
        return 0.5;
    }
    normalized
}

/// Map a normalized score to its five-level qualitative label.
pub fn score_level(score: f64) -> HealthLevel {
    if score >= 0.9 {
        HealthLevel::Excellent
    } else if score >= 0.8 {
        HealthLevel::Good
    } else if score >= 0.7 {
        HealthLevel::Fair
    } else if score >= 0.6 {
        HealthLevel::Poor
    } else {
        HealthLevel::Critical
    }
}

/// Improvement suggestions driven by whichever penalty dominates.
/// Additive: a struggling service collects several.
pub fn improvement_advice(predictions: &PredictionStats, alerts: &AlertStats) -> Vec<String> {
    let mut advice = Vec::new();

    if predictions.total_signals == 0 {
        advice.push(
            "No prediction signals in this period. Verify that model bindings are trained \
             and the generation schedule is running."
                .to_string(),
        );
        return advice;
    }

    if predictions.accuracy_rate < 0.7 {
        advice.push(format!(
            "Estimated accuracy is low ({:.0}%). Retrain the model bindings or review the \
             algorithm profile for this service.",
            predictions.accuracy_rate * 100.0
        ));
    }

    let anomaly_rate = predictions.anomaly_rate();
    if anomaly_rate > 0.2 {
        advice.push(format!(
            "Anomaly rate is high ({:.0}% of signals). Investigate the affected devices \
             before the trend worsens.",
            anomaly_rate * 100.0
        ));
    } else if anomaly_rate > 0.1 {
        advice.push(format!(
            "Anomaly rate is elevated ({:.0}% of signals). Keep the affected devices \
             under observation.",
            anomaly_rate * 100.0
        ));
    }

    if alerts.critical > 0 {
        advice.push(format!(
            "{} critical alert(s) were raised in this period. Triage them first; critical \
             alerts dominate the score penalty.",
            alerts.critical
        ));
    } else if alerts.warning > 5 {
        advice.push(format!(
            "{} warning alerts accumulated. Review whether they share a root cause.",
            alerts.warning
        ));
    }

    if advice.is_empty() {
        advice.push("Service is healthy. Keep the current monitoring configuration.".to_string());
    }
    advice
}
