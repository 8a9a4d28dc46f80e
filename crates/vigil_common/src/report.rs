//! Report content builder.
//!
//! Assembles aggregator, score and trend outputs into a persisted
//! report: a templated summary sentence, a threshold-driven findings
//! list, an additive recommendations list, and a detailed-analysis
//! block. Regenerating a report for an identical (scope, type, period)
//! is a deliberate no-op, detected by a pre-existence check.

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::health::{health_score, improvement_advice, score_level};
use crate::stats;
use crate::store::MonitorDb;
use crate::trend::{comprehensive_trend, linear_trend};
use crate::types::{Report, ReportScope, ReportType, StatsSummary, TrendVerdict};

/// Build and persist a report. Returns `Ok(None)` when a report for the
/// same (scope, type, period) already exists.
pub fn build_report(
    db: &MonitorDb,
    scope: &ReportScope,
    report_type: ReportType,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<Option<Report>> {
    if db.report_exists(scope, report_type, period_start, period_end)? {
        debug!(
            service = %scope.service_id,
            report_type = report_type.as_str(),
            "Report already exists for this period, skipping"
        );
        return Ok(None);
    }

    let summary_stats = stats::collect(db, scope, period_start, period_end)?;
    let score = health_score(&summary_stats.predictions, &summary_stats.alerts);

    let trend = match report_type {
        ReportType::Trend => Some(period_trend(db, scope, period_start, period_end)?),
        _ => None,
    };

    let summary = summary_sentence(&summary_stats, score, trend.as_ref());
    let findings = key_findings(&summary_stats, score, trend.as_ref());
    let mut recommendations = improvement_advice(&summary_stats.predictions, &summary_stats.alerts);
    if let Some(t) = &trend {
        if t.direction == crate::types::TrendDirection::Declining {
            recommendations.push(
                "Metrics are trending downward; schedule a configuration review before the \
                 next reporting period."
                    .to_string(),
            );
        }
    }
    let detail = detailed_analysis(&summary_stats, score, &findings, &recommendations, trend.as_ref());

    let report = Report {
        id: Uuid::new_v4(),
        service_id: scope.service_id,
        device_id: scope.device_id.clone(),
        report_type,
        period_start,
        period_end,
        stats: summary_stats,
        health_score: score,
        trend_direction: trend.as_ref().map(|t| t.direction),
        trend_confidence: trend.as_ref().map(|t| t.confidence),
        summary,
        findings,
        recommendations,
        detail,
        created_at: Utc::now(),
    };
    db.insert_report(&report)?;
    info!(
        service = %scope.service_id,
        report_type = report_type.as_str(),
        score,
        "Report persisted"
    );
    Ok(Some(report))
}

/// Monthly summary report: a health report whose period is the calendar
/// month containing `anchor`.
pub fn build_monthly_summary(
    db: &MonitorDb,
    scope: &ReportScope,
    anchor: DateTime<Utc>,
) -> Result<Option<Report>> {
    let (start, end) = month_period(anchor);
    build_report(db, scope, ReportType::Summary, start, end)
}

/// Calendar month bounds containing `anchor`, half-open.
pub fn month_period(anchor: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(anchor.year(), anchor.month(), 1, 0, 0, 0)
        .unwrap();
    let (next_year, next_month) = if anchor.month() == 12 {
        (anchor.year() + 1, 1)
    } else {
        (anchor.year(), anchor.month() + 1)
    };
    let end = Utc.with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0).unwrap();
    (start, end)
}

/// Per-day trend over the period: health score, estimated accuracy and
/// anomaly rate series fed into the composite analyzer. Days without
/// signals are skipped; two informative days are the minimum for a
/// directional verdict.
fn period_trend(
    db: &MonitorDb,
    scope: &ReportScope,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
) -> Result<TrendVerdict> {
    let mut health_series = Vec::new();
    let mut accuracy_series = Vec::new();
    let mut anomaly_series = Vec::new();

    let mut day_start = period_start;
    while day_start < period_end {
        let day_end = (day_start + Duration::days(1)).min(period_end);
        let day = stats::collect(db, scope, day_start, day_end)?;
        if day.predictions.total_signals > 0 {
            health_series.push(health_score(&day.predictions, &day.alerts));
            accuracy_series.push(day.predictions.accuracy_rate);
            anomaly_series.push(day.predictions.anomaly_rate());
        }
        day_start = day_end;
    }

    let health = linear_trend(&health_series);
    let accuracy = linear_trend(&accuracy_series);
    let anomaly = linear_trend(&anomaly_series);
    Ok(comprehensive_trend(&health, &accuracy, &anomaly))
}

fn summary_sentence(stats: &StatsSummary, score: f64, trend: Option<&TrendVerdict>) -> String {
    let level = score_level(score);
    let mut sentence = format!(
        "Health score {:.4} ({}): {} signals across {} device(s), {} anomalies, {} alert(s).",
        score,
        level.label(),
        stats.predictions.total_signals,
        stats.predictions.device_count,
        stats.predictions.anomaly_count,
        stats.alerts.total(),
    );
    if let Some(t) = trend {
        sentence.push_str(&format!(
            " Overall trend: {} (confidence {:.2}).",
            t.direction.as_str(),
            t.confidence
        ));
    }
    sentence
}

/// Threshold-driven findings: score bands, anomaly bands, accuracy
/// bands, critical-alert presence, quiet periods, confidence bands.
fn key_findings(stats: &StatsSummary, score: f64, trend: Option<&TrendVerdict>) -> Vec<String> {
    let mut findings = Vec::new();
    let predictions = &stats.predictions;
    let alerts = &stats.alerts;

    match score_level(score) {
        crate::health::HealthLevel::Excellent => {
            findings.push("Overall health is excellent for this period.".to_string())
        }
        crate::health::HealthLevel::Good => {
            findings.push("Overall health is good with minor degradation.".to_string())
        }
        crate::health::HealthLevel::Fair => {
            findings.push("Overall health is fair; degradation is measurable.".to_string())
        }
        crate::health::HealthLevel::Poor => {
            findings.push("Overall health is poor; intervention is advisable.".to_string())
        }
        crate::health::HealthLevel::Critical => {
            findings.push("Overall health is critical; immediate attention required.".to_string())
        }
    }

    if predictions.total_signals == 0 {
        findings.push("No prediction signals were generated in this period.".to_string());
        return findings;
    }

    let anomaly_rate = predictions.anomaly_rate();
    if anomaly_rate > 0.2 {
        findings.push(format!(
            "{:.0}% of signals were anomalous, well above the expected band.",
            anomaly_rate * 100.0
        ));
    } else if anomaly_rate > 0.1 {
        findings.push(format!(
            "{:.0}% of signals were anomalous, slightly above the expected band.",
            anomaly_rate * 100.0
        ));
    }

    if predictions.accuracy_rate >= 0.9 {
        findings.push("Estimated prediction accuracy is high.".to_string());
    } else if predictions.accuracy_rate < 0.7 {
        findings.push(format!(
            "Estimated prediction accuracy is low ({:.0}%).",
            predictions.accuracy_rate * 100.0
        ));
    }

    if alerts.critical > 0 {
        findings.push(format!(
            "{} critical alert(s) were raised in this period.",
            alerts.critical
        ));
    }
    if alerts.total() == 0 {
        findings.push("No alerts were raised in this period.".to_string());
    }

    if predictions.avg_confidence >= 0.85 {
        findings.push("Model confidence remained consistently high.".to_string());
    } else if predictions.avg_confidence < 0.6 {
        findings.push("Model confidence was low; predictions carry wide uncertainty.".to_string());
    }

    if let Some(t) = trend {
        findings.push(t.description.clone());
    }

    findings
}

fn detailed_analysis(
    stats: &StatsSummary,
    score: f64,
    findings: &[String],
    recommendations: &[String],
    trend: Option<&TrendVerdict>,
) -> String {
    let predictions = &stats.predictions;
    let alerts = &stats.alerts;
    let mut out = String::new();

    out.push_str(&format!(
        "Health score: {:.4} ({})\n\n",
        score,
        score_level(score).label()
    ));
    out.push_str("Prediction statistics:\n");
    out.push_str(&format!("  total signals: {}\n", predictions.total_signals));
    out.push_str(&format!(
        "  anomalies: {} ({:.1}%)\n",
        predictions.anomaly_count,
        predictions.anomaly_rate() * 100.0
    ));
    out.push_str(&format!(
        "  estimated accuracy: {:.1}%\n",
        predictions.accuracy_rate * 100.0
    ));
    out.push_str(&format!(
        "  confidence avg/min/max: {:.2}/{:.2}/{:.2}\n",
        predictions.avg_confidence, predictions.min_confidence, predictions.max_confidence
    ));
    out.push_str(&format!("  devices: {}\n", predictions.device_count));
    out.push_str(&format!(
        "Alerts: {} critical, {} warning, {} info\n",
        alerts.critical, alerts.warning, alerts.info
    ));
    if let Some(t) = trend {
        out.push_str(&format!(
            "Trend: {} (slope {:+.4}, confidence {:.2}, {} samples)\n",
            t.direction.as_str(),
            t.slope,
            t.confidence,
            t.sample_count
        ));
    }

    out.push_str("\nKey findings:\n");
    for finding in findings {
        out.push_str(&format!("  - {finding}\n"));
    }
    out.push_str("\nRecommendations:\n");
    for recommendation in recommendations {
        out.push_str(&format!("  - {recommendation}\n"));
    }
    out
}
