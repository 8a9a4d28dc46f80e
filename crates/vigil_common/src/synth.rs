//! Synthetic signal generator.
//!
//! Per monitored service: enumerate trained bindings, synthesize one
//! prediction per (device, metric) pair with the service's algorithm
//! profile, persist it, and raise an alert when the anomaly draw fires.
//!
//! Predicted values come from parameterized stochastic formulas, not
//! trained models: deterministic shape, randomized content. Randomness
//! is injected (`&mut impl Rng`) so every probability and range
//! contract below is testable with a seeded generator.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::store::{alert_for_signal, MonitorDb};
use crate::types::{AlgorithmProfile, ModelBinding, MonitoredService, PredictionSignal, TrainingRecord, TrainingStatus};

/// Accuracy assumed for a binding with no usable training history.
pub const DEFAULT_ACCURACY: f64 = 0.85;
/// Training records consulted for the smoothed accuracy.
pub const ACCURACY_HISTORY_DEPTH: usize = 10;

/// One synthesized draw: value, anomaly flag, confidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalDraw {
    pub value: f64,
    pub anomaly: bool,
    pub confidence: f64,
}

/// Outcome of one generation cycle for a service. Partial success is
/// the expected shape, not a failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenerationOutcome {
    pub signals: usize,
    pub alerts: usize,
    pub failures: usize,
}

/// Draw a base metric value from the type-specific range for a
/// normalized metric name.
pub fn base_value_for_metric(metric: &str, rng: &mut impl Rng) -> f64 {
    let normalized = metric.to_ascii_lowercase();
    let (low, high) = if normalized.contains("cpu") {
        (20.0, 80.0)
    } else if normalized.contains("mem") {
        (30.0, 80.0)
    } else if normalized.contains("disk") {
        (40.0, 80.0)
    } else if normalized.contains("net") {
        (10.0, 90.0)
    } else if normalized.contains("temp") {
        (35.0, 65.0)
    } else {
        (30.0, 70.0)
    };
    rng.gen_range(low..high)
}

/// Anomaly probability for a profile at a given smoothed accuracy.
///
/// Knn and Prophet derive it from accuracy with documented floors and
/// ceilings; the remaining profiles use fixed probabilities and ignore
/// training history entirely.
pub fn anomaly_probability(profile: AlgorithmProfile, avg_accuracy: f64) -> f64 {
    match profile {
        AlgorithmProfile::Knn => ((1.0 - avg_accuracy) * 0.8).clamp(0.02, 0.15),
        AlgorithmProfile::Prophet => ((1.0 - avg_accuracy) * 0.4).clamp(0.01, 0.08),
        AlgorithmProfile::Lstm => 0.05,
        AlgorithmProfile::Arima => 0.04,
        AlgorithmProfile::GradientBoost => 0.06,
        AlgorithmProfile::Default => 0.05,
    }
}

/// Smoothed accuracy over the most recent successful training records.
/// Defaults to 0.85 when no usable history exists.
pub fn average_accuracy(records: &[TrainingRecord]) -> f64 {
    let accuracies: Vec<f64> = records
        .iter()
        .filter(|r| r.status == TrainingStatus::Success)
        .take(ACCURACY_HISTORY_DEPTH)
        .map(|r| r.accuracy)
        .collect();
    if accuracies.is_empty() {
        DEFAULT_ACCURACY
    } else {
        accuracies.iter().sum::<f64>() / accuracies.len() as f64
    }
}

/// Box-Muller approximation of a normal draw.
fn gaussian(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-10);
    let u2: f64 = rng.gen();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std_dev * z
}

/// Synthesize one prediction for a profile.
///
/// Each arm is a pure function of (base value, smoothed accuracy,
/// current time, randomness source). `now` feeds only the periodic
/// terms; it is never a source of randomness.
pub fn synthesize(
    profile: AlgorithmProfile,
    base: f64,
    avg_accuracy: f64,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> SignalDraw {
    let anomaly = rng.gen::<f64>() < anomaly_probability(profile, avg_accuracy);
    let phase = now.timestamp() as f64;

    match profile {
        AlgorithmProfile::Knn => {
            let sigma = ((1.0 - avg_accuracy) * 0.3).max(0.05);
            let mut value = base * (1.0 + gaussian(rng, 0.0, sigma));
            if anomaly {
                // Inflate upward by 20-50%, scaled by accuracy.
                value *= 1.0 + rng.gen_range(0.2..0.5) * avg_accuracy;
            }
            let confidence = (avg_accuracy + 0.05 + gaussian(rng, 0.0, 0.02)).clamp(0.5, 0.95);
            SignalDraw {
                value,
                anomaly,
                confidence,
            }
        }
        AlgorithmProfile::Prophet => {
            // Slow weekly seasonality instead of pure noise.
            let seasonal = (phase / 86_400.0 * std::f64::consts::TAU / 7.0).sin() * 0.08;
            let mut value = base * (1.0 + seasonal + gaussian(rng, 0.0, 0.03));
            if anomaly {
                value *= 1.0 + rng.gen_range(0.1..0.3) * avg_accuracy;
            }
            let confidence = (avg_accuracy + 0.08 + gaussian(rng, 0.0, 0.01)).clamp(0.5, 0.95);
            SignalDraw {
                value,
                anomaly,
                confidence,
            }
        }
        AlgorithmProfile::Lstm => {
            let pattern = (phase / 86_400.0 * std::f64::consts::TAU).cos() * 0.06;
            let value = base * (1.0 + pattern + gaussian(rng, 0.0, 0.02));
            let confidence = (0.84 + gaussian(rng, 0.0, 0.03)).clamp(0.5, 0.95);
            SignalDraw {
                value,
                anomaly,
                confidence,
            }
        }
        AlgorithmProfile::Arima => {
            let value = base * (1.0 + gaussian(rng, 0.0, 0.05));
            let confidence = (0.82 + gaussian(rng, 0.0, 0.03)).clamp(0.5, 0.95);
            SignalDraw {
                value,
                anomaly,
                confidence,
            }
        }
        AlgorithmProfile::GradientBoost => {
            let s = (phase / 43_200.0 * std::f64::consts::TAU).sin();
            let value = base * (1.0 + 0.12 * s * s * s + gaussian(rng, 0.0, 0.02));
            let confidence = (0.86 + gaussian(rng, 0.0, 0.03)).clamp(0.5, 0.95);
            SignalDraw {
                value,
                anomaly,
                confidence,
            }
        }
        AlgorithmProfile::Default => {
            let value = base * (1.0 + gaussian(rng, 0.0, 0.08));
            let confidence = (0.8 + gaussian(rng, 0.0, 0.05)).clamp(0.5, 0.95);
            SignalDraw {
                value,
                anomaly,
                confidence,
            }
        }
    }
}

/// Run one generation cycle for a service: one signal per trained
/// binding, one alert per anomalous signal.
///
/// A failure on one binding is logged and skipped; the loop continues.
/// Bindings already written in the same cycle are never rolled back.
/// Stamps `last_generated_at` on the service; schedule advancement
/// belongs to the caller (due-claim or manual trigger).
pub fn generate_for_service(
    db: &MonitorDb,
    service: &MonitoredService,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<GenerationOutcome> {
    let bindings = db.trained_bindings(service.id)?;
    if bindings.is_empty() {
        debug!(service = %service.name, "No trained bindings, nothing to generate");
        return Ok(GenerationOutcome::default());
    }

    let mut outcome = GenerationOutcome::default();
    for binding in &bindings {
        match generate_for_binding(db, service, binding, now, rng) {
            Ok(raised_alert) => {
                outcome.signals += 1;
                if raised_alert {
                    outcome.alerts += 1;
                }
            }
            Err(e) => {
                warn!(
                    service = %service.name,
                    device = %binding.device_id,
                    metric = %binding.metric,
                    "Signal generation failed for binding: {e:#}"
                );
                outcome.failures += 1;
            }
        }
    }

    db.mark_generated(service.id, now)?;
    info!(
        service = %service.name,
        signals = outcome.signals,
        alerts = outcome.alerts,
        failures = outcome.failures,
        "Generation cycle complete"
    );
    Ok(outcome)
}

fn generate_for_binding(
    db: &MonitorDb,
    service: &MonitoredService,
    binding: &ModelBinding,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Result<bool> {
    let history = db.recent_training_records(binding.id, ACCURACY_HISTORY_DEPTH)?;
    let avg_accuracy = average_accuracy(&history);

    let base = base_value_for_metric(&binding.metric, rng);
    let draw = synthesize(service.profile, base, avg_accuracy, now, rng);

    let signal = PredictionSignal {
        id: Uuid::new_v4(),
        service_id: service.id,
        device_id: binding.device_id.clone(),
        binding_id: binding.id,
        predicted_at: now,
        value: draw.value,
        anomaly: draw.anomaly,
        confidence: draw.confidence,
        algorithm: service.profile.as_str().to_string(),
    };
    db.insert_signal(&signal)?;

    if draw.anomaly {
        db.insert_alert(&alert_for_signal(&signal, now))?;
    }
    Ok(draw.anomaly)
}

/// Next scheduled run after a cycle completes.
pub fn next_run_after(service: &MonitoredService, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(service.effective_cycle_days())
}
