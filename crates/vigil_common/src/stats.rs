//! Metrics aggregator.
//!
//! Reduces raw prediction signals and alerts for a (scope, window) into
//! a fresh statistical summary. Pure read path: no side effects,
//! idempotent, safe to run concurrently for different scopes. An empty
//! window is a valid, reportable state, never an error.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::error::VigilError;
use crate::store::MonitorDb;
use crate::types::{ReportScope, StatsSummary};

/// Anomaly-rate discount applied to the accuracy estimate.
const ANOMALY_DISCOUNT: f64 = 0.2;

/// Collect the statistical summary for a scope over a half-open window
/// `[start, end)`.
///
/// Accuracy here is estimated, not measured: the system never has
/// ground truth. The estimate starts from the mean confidence of all
/// signals in the window and is discounted by
/// `max(0, 1 - anomaly_rate * 0.2)` so high-anomaly periods never
/// report inflated accuracy.
pub fn collect(
    db: &MonitorDb,
    scope: &ReportScope,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<StatsSummary> {
    if start >= end {
        return Err(VigilError::InvalidWindow { start, end }.into());
    }

    let mut predictions = db.signal_stats_in_window(scope, start, end)?;
    let alerts = db.alert_counts_in_window(scope, start, end)?;

    if predictions.total_signals > 0 {
        let discount = (1.0 - predictions.anomaly_rate() * ANOMALY_DISCOUNT).max(0.0);
        predictions.accuracy_rate = predictions.avg_confidence * discount;
    }

    Ok(StatsSummary {
        predictions,
        alerts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Alert, AlertLevel, AlertStatus, AlgorithmProfile, ModelBinding, MonitoredService,
        PredictionSignal, TrainingStatus,
    };
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    fn seeded_db() -> (MonitorDb, Uuid, Uuid) {
        let db = MonitorDb::open_in_memory().unwrap();
        let service_id = Uuid::new_v4();
        db.insert_service(&MonitoredService {
            id: service_id,
            name: "fleet".to_string(),
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
        })
        .unwrap();
        let binding_id = Uuid::new_v4();
        db.insert_binding(&ModelBinding {
            id: binding_id,
            service_id,
            device_id: "dev-1".to_string(),
            monitor_type: "host".to_string(),
            metric: "cpu".to_string(),
            training_status: TrainingStatus::Success,
            last_train_at: None,
        })
        .unwrap();
        (db, service_id, binding_id)
    }

    fn push_signal(
        db: &MonitorDb,
        svc: Uuid,
        bind: Uuid,
        at: DateTime<Utc>,
        anomaly: bool,
        confidence: f64,
    ) {
        db.insert_signal(&PredictionSignal {
            id: Uuid::new_v4(),
            service_id: svc,
            device_id: "dev-1".to_string(),
            binding_id: bind,
            predicted_at: at,
            value: 50.0,
            anomaly,
            confidence,
            algorithm: "knn".to_string(),
        })
        .unwrap();
    }

    #[test]
    fn test_empty_window_yields_zero_summary() {
        let (db, svc, _) = seeded_db();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let summary = collect(
            &db,
            &ReportScope::service(svc),
            start,
            start + Duration::days(1),
        )
        .unwrap();
        assert_eq!(summary.predictions.total_signals, 0);
        assert_eq!(summary.predictions.accuracy_rate, 0.0);
        assert_eq!(summary.alerts.total(), 0);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let (db, svc, _) = seeded_db();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let err = collect(&db, &ReportScope::service(svc), start, start).unwrap_err();
        assert!(err.to_string().contains("Invalid time window"));
    }

    #[test]
    fn test_accuracy_is_discounted_by_anomaly_rate() {
        let (db, svc, bind) = seeded_db();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        // 4 signals, 1 anomalous, all at confidence 0.8.
        for i in 0..4 {
            push_signal(&db, svc, bind, start + Duration::minutes(i), i == 0, 0.8);
        }
        let summary = collect(
            &db,
            &ReportScope::service(svc),
            start,
            start + Duration::days(1),
        )
        .unwrap();
        assert_eq!(summary.predictions.total_signals, 4);
        assert_eq!(summary.predictions.anomaly_count, 1);
        // 0.8 * (1 - 0.25 * 0.2) = 0.76
        assert_relative_eq!(summary.predictions.accuracy_rate, 0.76, epsilon = 1e-9);
        assert_relative_eq!(summary.predictions.avg_confidence, 0.8, epsilon = 1e-9);
    }

    #[test]
    fn test_alert_counts_flow_through() {
        let (db, svc, bind) = seeded_db();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        push_signal(&db, svc, bind, start, false, 0.9);
        db.insert_alert(&Alert {
            id: Uuid::new_v4(),
            service_id: svc,
            device_id: "dev-1".to_string(),
            signal_id: None,
            level: AlertLevel::Warning,
            status: AlertStatus::Active,
            message: "warn".to_string(),
            raised_at: start,
        })
        .unwrap();
        let summary = collect(
            &db,
            &ReportScope::service(svc),
            start,
            start + Duration::days(1),
        )
        .unwrap();
        assert_eq!(summary.alerts.warning, 1);
        assert_eq!(summary.alerts.total(), 1);
    }

    #[test]
    fn test_device_scope_narrows() {
        let (db, svc, bind) = seeded_db();
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        push_signal(&db, svc, bind, start, false, 0.9);
        let other = collect(
            &db,
            &ReportScope::device(svc, "dev-2"),
            start,
            start + Duration::days(1),
        )
        .unwrap();
        assert_eq!(other.predictions.total_signals, 0);
        let scoped = collect(
            &db,
            &ReportScope::device(svc, "dev-1"),
            start,
            start + Duration::days(1),
        )
        .unwrap();
        assert_eq!(scoped.predictions.total_signals, 1);
    }
}
