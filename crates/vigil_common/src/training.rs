//! Asynchronous training simulation.
//!
//! Starting a training returns immediately with an accepted
//! acknowledgement; the simulated run completes on a background task.
//! Completion contract: on both the success and the failure path the
//! task flips the binding's training status and appends a training
//! record. Callers poll training history rather than block.

use anyhow::Result;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::VigilError;
use crate::store::MonitorDb;
use crate::types::{TrainingRecord, TrainingStatus};

/// Knobs for the simulated run. Production keeps the tens-of-seconds
/// default; tests shrink the duration to near zero.
#[derive(Debug, Clone, Copy)]
pub struct TrainingOptions {
    pub simulate_for: Duration,
    pub failure_rate: f64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            simulate_for: Duration::from_secs(30),
            failure_rate: 0.05,
        }
    }
}

/// Immediate acknowledgement of an accepted training run.
#[derive(Debug, Clone)]
pub struct TrainingAccepted {
    pub binding_id: Uuid,
    pub service_id: Uuid,
    pub model_version: String,
    pub started_at: chrono::DateTime<Utc>,
}

/// Start a simulated training run for one binding.
///
/// Returns the acknowledgement and the completion handle. The draw of
/// the run's outcome happens up front from the injected randomness
/// source, so a seeded generator makes the whole run deterministic.
pub fn start_training(
    db: Arc<MonitorDb>,
    binding_id: Uuid,
    options: TrainingOptions,
    rng: &mut impl Rng,
) -> Result<(TrainingAccepted, JoinHandle<()>)> {
    let binding = db
        .get_binding(binding_id)?
        .ok_or(VigilError::BindingNotFound(binding_id))?;

    let started_at = Utc::now();
    db.set_training_status(binding_id, TrainingStatus::Running, started_at)?;

    let succeeds = rng.gen::<f64>() >= options.failure_rate;
    let accuracy = if succeeds { rng.gen_range(0.75..0.98) } else { 0.0 };
    let sample_count = rng.gen_range(500..5000);
    let model_version = format!("m-{}", started_at.timestamp());

    let accepted = TrainingAccepted {
        binding_id,
        service_id: binding.service_id,
        model_version: model_version.clone(),
        started_at,
    };

    info!(
        binding = %binding_id,
        device = %binding.device_id,
        metric = %binding.metric,
        "Training accepted, running in background"
    );

    let handle = tokio::spawn(async move {
        tokio::time::sleep(options.simulate_for).await;
        let ended_at = Utc::now();
        let status = if succeeds {
            TrainingStatus::Success
        } else {
            TrainingStatus::Failed
        };

        if let Err(e) = db.set_training_status(binding_id, status, ended_at) {
            error!(binding = %binding_id, "Failed to record training status: {e:#}");
        }
        let record = TrainingRecord {
            id: Uuid::new_v4(),
            service_id: binding.service_id,
            binding_id,
            started_at,
            ended_at: Some(ended_at),
            status,
            duration_secs: (ended_at - started_at).num_seconds().max(0),
            sample_count,
            accuracy,
            model_version,
        };
        if let Err(e) = db.append_training_record(&record) {
            error!(binding = %binding_id, "Failed to append training record: {e:#}");
        }
        info!(
            binding = %binding_id,
            status = status.as_str(),
            accuracy,
            "Training run finished"
        );
    });

    Ok((accepted, handle))
}

/// Fan training out over every binding of a service.
pub fn start_service_training(
    db: Arc<MonitorDb>,
    service_id: Uuid,
    options: TrainingOptions,
    rng: &mut impl Rng,
) -> Result<(Vec<TrainingAccepted>, Vec<JoinHandle<()>>)> {
    let service = db
        .get_service(service_id)?
        .ok_or(VigilError::ServiceNotFound(service_id))?;
    if service.deleted || !service.enabled {
        return Err(VigilError::ServiceUnavailable(service_id).into());
    }

    let bindings = db.bindings_for_service(service_id)?;
    let mut accepted = Vec::with_capacity(bindings.len());
    let mut handles = Vec::with_capacity(bindings.len());
    for binding in bindings {
        let (ack, handle) = start_training(db.clone(), binding.id, options, rng)?;
        accepted.push(ack);
        handles.push(handle);
    }
    Ok((accepted, handles))
}
