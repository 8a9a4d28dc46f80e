//! Trigger surface.
//!
//! The operations consumed from outside the engine: run the due-check
//! now, force-generate for one service, force-train a binding or a
//! whole service, build a report. Every trigger returns a typed
//! outcome - the created entity, an "already exists / nothing to do"
//! signal, or a rejection with a human-readable reason - never a bare
//! boolean.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use vigil_common::report;
use vigil_common::store::MonitorDb;
use vigil_common::synth::{self, GenerationOutcome};
use vigil_common::training::{self, TrainingAccepted, TrainingOptions};
use vigil_common::types::{Report, ReportScope, ReportType};

use crate::scheduler::GenerationScheduler;

/// Result of a trigger operation.
#[derive(Debug)]
pub enum TriggerOutcome {
    /// Generation ran; the per-binding tallies are attached.
    Generated {
        service_id: Uuid,
        outcome: GenerationOutcome,
    },
    /// The due-check ran; this many services were dispatched.
    DueCheckCompleted { dispatched: usize },
    /// Training accepted for these bindings; poll history for results.
    TrainingStarted { accepted: Vec<TrainingAccepted> },
    /// A report was created and persisted.
    ReportCreated(Box<Report>),
    /// A report for this (scope, type, period) already exists.
    AlreadyExists,
    /// Caller misuse; the reason is human-readable.
    Rejected { reason: String },
}

impl TriggerOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!("Trigger rejected: {reason}");
        TriggerOutcome::Rejected { reason }
    }
}

/// Run the scheduler's due-check immediately.
pub async fn run_due_check_now(scheduler: &GenerationScheduler) -> TriggerOutcome {
    let dispatched = scheduler.tick_once().await;
    TriggerOutcome::DueCheckCompleted { dispatched }
}

/// Generate signals for one service right now, bypassing the due-check.
/// The cached schedule still advances one cycle from now.
pub fn force_generate(db: &Arc<MonitorDb>, service_id: Uuid) -> TriggerOutcome {
    let service = match db.get_service(service_id) {
        Ok(Some(service)) => service,
        Ok(None) => return TriggerOutcome::rejected(format!("Service not found: {service_id}")),
        Err(e) => return TriggerOutcome::rejected(format!("Service lookup failed: {e:#}")),
    };
    if service.deleted || !service.enabled {
        return TriggerOutcome::rejected(format!(
            "Service is disabled or deleted: {}",
            service.name
        ));
    }

    let now = Utc::now();
    let mut rng = StdRng::from_entropy();
    match synth::generate_for_service(db, &service, now, &mut rng) {
        Ok(outcome) => {
            if let Err(e) = db.advance_schedule(service.id, synth::next_run_after(&service, now)) {
                warn!(service = %service.name, "Could not advance schedule: {e:#}");
            }
            TriggerOutcome::Generated {
                service_id: service.id,
                outcome,
            }
        }
        Err(e) => TriggerOutcome::rejected(format!("Generation failed: {e:#}")),
    }
}

/// Start training for one binding. Returns immediately; the run
/// completes on a background task.
pub fn force_train(
    db: &Arc<MonitorDb>,
    binding_id: Uuid,
    options: TrainingOptions,
) -> TriggerOutcome {
    let mut rng = StdRng::from_entropy();
    match training::start_training(db.clone(), binding_id, options, &mut rng) {
        Ok((accepted, _handle)) => TriggerOutcome::TrainingStarted {
            accepted: vec![accepted],
        },
        Err(e) => TriggerOutcome::rejected(format!("Training not started: {e:#}")),
    }
}

/// Start training for every binding of a service.
pub fn force_train_service(
    db: &Arc<MonitorDb>,
    service_id: Uuid,
    options: TrainingOptions,
) -> TriggerOutcome {
    let mut rng = StdRng::from_entropy();
    match training::start_service_training(db.clone(), service_id, options, &mut rng) {
        Ok((accepted, _handles)) => TriggerOutcome::TrainingStarted { accepted },
        Err(e) => TriggerOutcome::rejected(format!("Training not started: {e:#}")),
    }
}

/// Build a report of the given type for a scope and period.
pub fn build_report(
    db: &Arc<MonitorDb>,
    scope: &ReportScope,
    report_type: ReportType,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> TriggerOutcome {
    if period_start >= period_end {
        return TriggerOutcome::rejected(format!(
            "Invalid period: {period_start} is not before {period_end}"
        ));
    }
    if !matches!(db.get_service(scope.service_id), Ok(Some(s)) if !s.deleted) {
        return TriggerOutcome::rejected(format!("Service not found: {}", scope.service_id));
    }

    match report::build_report(db, scope, report_type, period_start, period_end) {
        Ok(Some(report)) => TriggerOutcome::ReportCreated(Box::new(report)),
        Ok(None) => TriggerOutcome::AlreadyExists,
        Err(e) => TriggerOutcome::rejected(format!("Report build failed: {e:#}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vigil_common::types::{
        AlgorithmProfile, ModelBinding, MonitoredService, TrainingStatus,
    };

    fn seeded_db() -> (Arc<MonitorDb>, MonitoredService, ModelBinding) {
        let db = Arc::new(MonitorDb::open_in_memory().unwrap());
        let service = MonitoredService {
            id: Uuid::new_v4(),
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
        };
        db.insert_service(&service).unwrap();
        let binding = ModelBinding {
            id: Uuid::new_v4(),
            service_id: service.id,
            device_id: "dev-1".to_string(),
            monitor_type: "host".to_string(),
            metric: "cpu".to_string(),
            training_status: TrainingStatus::Success,
            last_train_at: None,
        };
        db.insert_binding(&binding).unwrap();
        (db, service, binding)
    }

    #[test]
    fn test_force_generate_runs_and_advances_schedule() {
        let (db, service, _) = seeded_db();
        let outcome = force_generate(&db, service.id);
        match outcome {
            TriggerOutcome::Generated { outcome, .. } => {
                assert_eq!(outcome.signals, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let refreshed = db.get_service(service.id).unwrap().unwrap();
        assert!(refreshed.next_run_at.is_some());
    }

    #[test]
    fn test_force_generate_unknown_service_rejected() {
        let (db, _, _) = seeded_db();
        match force_generate(&db, Uuid::new_v4()) {
            TriggerOutcome::Rejected { reason } => {
                assert!(reason.contains("Service not found"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_force_generate_deleted_service_rejected() {
        let (db, service, _) = seeded_db();
        db.soft_delete_service(service.id).unwrap();
        assert!(matches!(
            force_generate(&db, service.id),
            TriggerOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn test_build_report_then_already_exists() {
        let (db, service, _) = seeded_db();
        force_generate(&db, service.id);

        let scope = ReportScope::service(service.id);
        let now = Utc::now();
        let start = now - Duration::days(1);
        let end = now + Duration::days(1);

        assert!(matches!(
            build_report(&db, &scope, ReportType::Health, start, end),
            TriggerOutcome::ReportCreated(_)
        ));
        assert!(matches!(
            build_report(&db, &scope, ReportType::Health, start, end),
            TriggerOutcome::AlreadyExists
        ));
    }

    #[test]
    fn test_build_report_rejects_backwards_period() {
        let (db, service, _) = seeded_db();
        let scope = ReportScope::service(service.id);
        let now = Utc::now();
        assert!(matches!(
            build_report(&db, &scope, ReportType::Health, now, now - Duration::days(1)),
            TriggerOutcome::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_force_train_unknown_binding_rejected() {
        let (db, _, _) = seeded_db();
        let options = TrainingOptions {
            simulate_for: std::time::Duration::from_millis(1),
            failure_rate: 0.0,
        };
        assert!(matches!(
            force_train(&db, Uuid::new_v4(), options),
            TriggerOutcome::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn test_force_train_accepts_known_binding() {
        let (db, _, binding) = seeded_db();
        let options = TrainingOptions {
            simulate_for: std::time::Duration::from_millis(1),
            failure_rate: 0.0,
        };
        match force_train(&db, binding.id, options) {
            TriggerOutcome::TrainingStarted { accepted } => {
                assert_eq!(accepted.len(), 1);
                assert_eq!(accepted[0].binding_id, binding.id);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        // Acknowledged immediately: the binding is already Running.
        let running = db.get_binding(binding.id).unwrap().unwrap();
        assert_eq!(running.training_status, TrainingStatus::Running);
    }
}
