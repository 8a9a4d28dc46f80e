//! Trend analyzer.
//!
//! Ordinary least-squares regression over an ordered series of values,
//! with the index position as the independent variable. Short series
//! are expected early in a service's life and return a stable verdict,
//! never an error.

use crate::types::{TrendDirection, TrendVerdict};

/// Slopes with magnitude below this are reported as stable.
const STABLE_SLOPE_EPSILON: f64 = 0.001;
/// Composite verdict thresholds on the weighted direction score.
const COMPOSITE_THRESHOLD: f64 = 0.1;

/// Weights for the composite verdict: health, accuracy, anomaly.
const HEALTH_WEIGHT: f64 = 0.5;
const ACCURACY_WEIGHT: f64 = 0.3;
const ANOMALY_WEIGHT: f64 = 0.2;

/// Regress a metric series against its index positions.
///
/// Fewer than two points returns Stable at confidence 0.5 with an
/// explanatory description. Direction is sign-of-slope; callers decide
/// per metric whether a rising slope is desirable. Confidence grows
/// with history length and slope magnitude, capped at 0.95.
pub fn linear_trend(values: &[f64]) -> TrendVerdict {
    let n = values.len();
    if n < 2 {
        return TrendVerdict {
            direction: TrendDirection::Stable,
            confidence: 0.5,
            slope: 0.0,
            description: format!(
                "Insufficient history ({} point{}); at least 2 needed for a trend",
                n,
                if n == 1 { "" } else { "s" }
            ),
            sample_count: n,
        };
    }

    let count = n as f64;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut sum_xy = 0.0;
    let mut sum_x2 = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denominator = count * sum_x2 - sum_x * sum_x;
    let slope = if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        (count * sum_xy - sum_x * sum_y) / denominator
    };

    let direction = if slope.abs() < STABLE_SLOPE_EPSILON {
        TrendDirection::Stable
    } else if slope > 0.0 {
        TrendDirection::Improving
    } else {
        TrendDirection::Declining
    };

    let confidence = (0.3 + 0.1 * count + 2.0 * slope.abs()).min(0.95);

    TrendVerdict {
        direction,
        confidence,
        slope,
        description: describe(direction, slope, n),
        sample_count: n,
    }
}

fn describe(direction: TrendDirection, slope: f64, n: usize) -> String {
    match direction {
        TrendDirection::Improving => {
            format!("Rising trend over {} points (slope {:+.4})", n, slope)
        }
        TrendDirection::Declining => {
            format!("Falling trend over {} points (slope {:+.4})", n, slope)
        }
        _ => format!("No significant trend over {} points", n),
    }
}

fn direction_score(verdict: &TrendVerdict) -> f64 {
    match verdict.direction {
        TrendDirection::Improving => 1.0,
        TrendDirection::Declining => -1.0,
        _ => 0.0,
    }
}

/// Combine health, accuracy and anomaly trends into one verdict.
///
/// Weights 0.5 / 0.3 / 0.2. Anomaly's contribution is sign-inverted: a
/// declining anomaly rate counts toward improvement. The composite
/// confidence is the unweighted mean of the three component
/// confidences.
pub fn comprehensive_trend(
    health: &TrendVerdict,
    accuracy: &TrendVerdict,
    anomaly: &TrendVerdict,
) -> TrendVerdict {
    let weighted = HEALTH_WEIGHT * direction_score(health)
        + ACCURACY_WEIGHT * direction_score(accuracy)
        - ANOMALY_WEIGHT * direction_score(anomaly);

    let direction = if weighted > COMPOSITE_THRESHOLD {
        TrendDirection::Improving
    } else if weighted < -COMPOSITE_THRESHOLD {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    };

    let confidence = (health.confidence + accuracy.confidence + anomaly.confidence) / 3.0;
    let sample_count = health
        .sample_count
        .max(accuracy.sample_count)
        .max(anomaly.sample_count);

    let description = match direction {
        TrendDirection::Improving => "Overall trajectory is improving across health, accuracy \
             and anomaly metrics"
            .to_string(),
        TrendDirection::Declining => "Overall trajectory is declining; health or anomaly \
             metrics are moving the wrong way"
            .to_string(),
        _ => "Overall trajectory is stable".to_string(),
    };

    TrendVerdict {
        direction,
        confidence,
        slope: weighted,
        description,
        sample_count,
    }
}
