//! Core domain types for the prediction engine.
//!
//! Everything the store persists (services, bindings, training history,
//! signals, alerts, reports) plus the ephemeral computation results
//! (stats summaries, trend verdicts) that are recomputed on every query
//! and never cached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VigilError;

/// Algorithm profile a monitored service generates signals with.
///
/// A closed set: each variant selects a synthesis formula, not a real
/// trained model. Unknown strings read back as `Default` so an old
/// database row can never poison a due-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlgorithmProfile {
    Knn,
    Prophet,
    Lstm,
    Arima,
    GradientBoost,
    #[default]
    Default,
}

impl AlgorithmProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmProfile::Knn => "knn",
            AlgorithmProfile::Prophet => "prophet",
            AlgorithmProfile::Lstm => "lstm",
            AlgorithmProfile::Arima => "arima",
            AlgorithmProfile::GradientBoost => "gradient_boost",
            AlgorithmProfile::Default => "default",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "knn" => AlgorithmProfile::Knn,
            "prophet" => AlgorithmProfile::Prophet,
            "lstm" => AlgorithmProfile::Lstm,
            "arima" => AlgorithmProfile::Arima,
            "gradient_boost" => AlgorithmProfile::GradientBoost,
            _ => AlgorithmProfile::Default,
        }
    }
}

/// Training lifecycle of a model binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrainingStatus {
    #[default]
    Untrained,
    Running,
    Success,
    Failed,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Untrained => "untrained",
            TrainingStatus::Running => "running",
            TrainingStatus::Success => "success",
            TrainingStatus::Failed => "failed",
        }
    }

    /// Strict parse. An unknown status is caller misuse, not a runtime
    /// condition, so it surfaces as a rejected operation.
    pub fn parse(s: &str) -> Result<Self, VigilError> {
        match s {
            "untrained" => Ok(TrainingStatus::Untrained),
            "running" => Ok(TrainingStatus::Running),
            "success" => Ok(TrainingStatus::Success),
            "failed" => Ok(TrainingStatus::Failed),
            other => Err(VigilError::InvalidStatus(other.to_string())),
        }
    }
}

/// Alert severity, derived from signal confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl AlertLevel {
    /// Severity thresholds: confidence >= 0.9 is critical, >= 0.7 is a
    /// warning, anything lower is informational.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            AlertLevel::Critical
        } else if confidence >= 0.7 {
            AlertLevel::Warning
        } else {
            AlertLevel::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AlertStatus {
    #[default]
    Active,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    Health,
    Trend,
    Summary,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Health => "health",
            ReportType::Trend => "trend",
            ReportType::Summary => "summary",
        }
    }
}

/// A monitored service: one prediction configuration over a fleet of
/// devices. Consumed by the scheduler; soft-deleting it cascades to its
/// bindings and hides its signals, alerts and reports from every read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredService {
    pub id: Uuid,
    pub name: String,
    pub profile: AlgorithmProfile,
    /// Days between generation cycles. Values below 1 behave as 1.
    pub update_cycle_days: i64,
    pub prediction_cycle_days: i64,
    pub prediction_duration_days: i64,
    pub auto_generate: bool,
    pub enabled: bool,
    pub last_train_at: Option<DateTime<Utc>>,
    pub last_generated_at: Option<DateTime<Utc>>,
    /// Persisted schedule record: when the next generation cycle is due.
    /// `None` means never generated, which counts as due.
    pub next_run_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl MonitoredService {
    /// Effective cycle length: the configured value, floored at one day.
    pub fn effective_cycle_days(&self) -> i64 {
        self.update_cycle_days.max(1)
    }
}

/// A (service, device, monitoring type, metric) tuple eligible for
/// signal generation once trained. Unique per tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBinding {
    pub id: Uuid,
    pub service_id: Uuid,
    pub device_id: String,
    pub monitor_type: String,
    pub metric: String,
    pub training_status: TrainingStatus,
    pub last_train_at: Option<DateTime<Utc>>,
}

/// One row of append-only training history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: Uuid,
    pub service_id: Uuid,
    pub binding_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: TrainingStatus,
    pub duration_secs: i64,
    pub sample_count: i64,
    /// Accuracy in [0, 1]. Feeds the generator's stochastic parameters.
    pub accuracy: f64,
    pub model_version: String,
}

/// One synthetic prediction record. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSignal {
    pub id: Uuid,
    pub service_id: Uuid,
    pub device_id: String,
    pub binding_id: Uuid,
    pub predicted_at: DateTime<Utc>,
    pub value: f64,
    pub anomaly: bool,
    pub confidence: f64,
    pub algorithm: String,
}

/// Alert raised from an anomalous signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub service_id: Uuid,
    pub device_id: String,
    pub signal_id: Option<Uuid>,
    pub level: AlertLevel,
    pub status: AlertStatus,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Query scope: one service, optionally narrowed to a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportScope {
    pub service_id: Uuid,
    pub device_id: Option<String>,
}

impl ReportScope {
    pub fn service(service_id: Uuid) -> Self {
        Self {
            service_id,
            device_id: None,
        }
    }

    pub fn device(service_id: Uuid, device_id: impl Into<String>) -> Self {
        Self {
            service_id,
            device_id: Some(device_id.into()),
        }
    }
}

/// Signal-side aggregate for one (scope, window). Ephemeral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PredictionStats {
    pub total_signals: u64,
    pub anomaly_count: u64,
    /// Estimated accuracy in [0, 1]. A heuristic proxy: mean confidence
    /// discounted by the anomaly rate. There is no ground truth here.
    pub accuracy_rate: f64,
    pub avg_confidence: f64,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub device_count: u64,
}

impl PredictionStats {
    pub fn anomaly_rate(&self) -> f64 {
        if self.total_signals == 0 {
            0.0
        } else {
            self.anomaly_count as f64 / self.total_signals as f64
        }
    }
}

/// Alert-side aggregate for one (scope, window). Ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AlertStats {
    pub info: u64,
    pub warning: u64,
    pub critical: u64,
}

impl AlertStats {
    pub fn total(&self) -> u64 {
        self.info + self.warning + self.critical
    }
}

/// Statistical summary of one (scope, window). Derived fresh per query,
/// never persisted or cached beyond one computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatsSummary {
    pub predictions: PredictionStats,
    pub alerts: AlertStats,
}

/// Direction of a metric's evolution over an ordered series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TrendDirection {
    Improving,
    #[default]
    Stable,
    Declining,
    Unknown,
    Error,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Improving => "improving",
            TrendDirection::Stable => "stable",
            TrendDirection::Declining => "declining",
            TrendDirection::Unknown => "unknown",
            TrendDirection::Error => "error",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "improving" => TrendDirection::Improving,
            "stable" => TrendDirection::Stable,
            "declining" => TrendDirection::Declining,
            "error" => TrendDirection::Error,
            _ => TrendDirection::Unknown,
        }
    }
}

/// Regression verdict for one metric series. Ephemeral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendVerdict {
    pub direction: TrendDirection,
    pub confidence: f64,
    pub slope: f64,
    pub description: String,
    pub sample_count: usize,
}

/// Persisted report snapshot: the stats summary flattened, the health
/// score, optional trend verdict, and four narrative text blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub service_id: Uuid,
    pub device_id: Option<String>,
    pub report_type: ReportType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub stats: StatsSummary,
    pub health_score: f64,
    pub trend_direction: Option<TrendDirection>,
    pub trend_confidence: Option<f64>,
    pub summary: String,
    pub findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_roundtrip() {
        for profile in [
            AlgorithmProfile::Knn,
            AlgorithmProfile::Prophet,
            AlgorithmProfile::Lstm,
            AlgorithmProfile::Arima,
            AlgorithmProfile::GradientBoost,
            AlgorithmProfile::Default,
        ] {
            assert_eq!(AlgorithmProfile::from_str_lossy(profile.as_str()), profile);
        }
    }

    #[test]
    fn test_profile_unknown_maps_to_default() {
        assert_eq!(
            AlgorithmProfile::from_str_lossy("quantum"),
            AlgorithmProfile::Default
        );
    }

    #[test]
    fn test_training_status_strict_parse() {
        assert_eq!(
            TrainingStatus::parse("success").unwrap(),
            TrainingStatus::Success
        );
        assert!(TrainingStatus::parse("finished").is_err());
    }

    #[test]
    fn test_alert_level_thresholds() {
        assert_eq!(AlertLevel::from_confidence(0.95), AlertLevel::Critical);
        assert_eq!(AlertLevel::from_confidence(0.9), AlertLevel::Critical);
        assert_eq!(AlertLevel::from_confidence(0.89), AlertLevel::Warning);
        assert_eq!(AlertLevel::from_confidence(0.7), AlertLevel::Warning);
        assert_eq!(AlertLevel::from_confidence(0.69), AlertLevel::Info);
        assert_eq!(AlertLevel::from_confidence(0.0), AlertLevel::Info);
    }

    #[test]
    fn test_anomaly_rate_empty_window() {
        let stats = PredictionStats::default();
        assert_eq!(stats.anomaly_rate(), 0.0);
    }

    #[test]
    fn test_effective_cycle_floors_at_one() {
        let mut service = sample_service();
        service.update_cycle_days = 0;
        assert_eq!(service.effective_cycle_days(), 1);
        service.update_cycle_days = -3;
        assert_eq!(service.effective_cycle_days(), 1);
        service.update_cycle_days = 7;
        assert_eq!(service.effective_cycle_days(), 7);
    }

    fn sample_service() -> MonitoredService {
        MonitoredService {
            id: Uuid::new_v4(),
            name: "edge-fleet".to_string(),
            profile: AlgorithmProfile::Knn,
            update_cycle_days: 1,
            prediction_cycle_days: 1,
            prediction_duration_days: 7,
            auto_generate: true,
            enabled: true,
            last_train_at: None,
            last_generated_at: None,
            next_run_at: None,
            deleted: false,
        }
    }
}
