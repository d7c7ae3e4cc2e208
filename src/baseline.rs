//! Rolling-window baseline estimation for recovery metrics
//!
//! A baseline is a recency-weighted typical value for one metric, built from
//! several rolling windows ending at a fixed date. Short windows dominate the
//! weighting so the baseline tracks the athlete's current state while long
//! windows keep it from chasing week-to-week noise.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};
use std::collections::BTreeMap;

/// Window lengths evaluated per metric, in days
pub const BASELINE_WINDOWS: [i64; 4] = [30, 60, 90, 180];

/// Minimum samples a window must hold to contribute to the baseline
pub const MIN_WINDOW_SAMPLES: usize = 14;

/// Recency weight for a window length, before renormalization
///
/// The 0.40/0.30/0.20/0.10 weighting is carried as the integer ratio
/// 4:3:2:1 so that blending equal medians reproduces them exactly; the
/// fractional weights accumulate a 1-ulp error that a flat series must not
/// inherit. Only the listed lengths carry weight; anything else falls
/// through to the median-of-medians fallback in [`compute_baseline`].
fn recency_weight(window_days: i64) -> Option<u32> {
    match window_days {
        30 => Some(4),
        60 => Some(3),
        90 => Some(2),
        180 => Some(1),
        _ => None,
    }
}

/// Summary statistics for one retained window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub window_days: i64,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub sample_count: usize,
    pub median: f64,
    pub mean: f64,
}

/// Baseline for one metric at one point in time
///
/// `value` is `None` when no window retained enough samples. `by_window`
/// keeps the per-window statistics for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineResult {
    pub value: Option<f64>,
    pub by_window: BTreeMap<i64, WindowStats>,
}

impl BaselineResult {
    pub fn empty() -> Self {
        Self {
            value: None,
            by_window: BTreeMap::new(),
        }
    }
}

/// Compute the recency-weighted baseline of one metric ending at `end`
///
/// Samples may arrive unordered. A window spans `end - (window - 1)` through
/// `end` inclusive and is dropped entirely when fewer than
/// [`MIN_WINDOW_SAMPLES`] usable samples fall inside it. When
/// `treat_zero_as_missing` is set, zero-valued samples are skipped; wearables
/// report 0 for days a metric was not measured.
///
/// The baseline combines retained window medians with the recency weights,
/// renormalized over the windows actually present. If none of the retained
/// windows carries a weight, the plain median of the retained medians is
/// used instead.
pub fn compute_baseline(
    samples: &[(NaiveDate, f64)],
    end: NaiveDate,
    treat_zero_as_missing: bool,
) -> BaselineResult {
    let mut by_window = BTreeMap::new();

    for &window_days in &BASELINE_WINDOWS {
        let start = end - Duration::days(window_days - 1);
        let values: Vec<f64> = samples
            .iter()
            .filter(|(date, value)| {
                *date >= start && *date <= end && !(treat_zero_as_missing && *value == 0.0)
            })
            .map(|(_, value)| *value)
            .collect();

        if values.len() < MIN_WINDOW_SAMPLES {
            continue;
        }

        let sample_count = values.len();
        let mean = (&values).mean();
        let median = Data::new(values).median();

        by_window.insert(
            window_days,
            WindowStats {
                window_days,
                start,
                end,
                sample_count,
                median,
                mean,
            },
        );
    }

    if by_window.is_empty() {
        return BaselineResult::empty();
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0u32;
    for (window_days, stats) in &by_window {
        if let Some(weight) = recency_weight(*window_days) {
            weighted_sum += weight as f64 * stats.median;
            weight_total += weight;
        }
    }

    let value = if weight_total > 0 {
        weighted_sum / weight_total as f64
    } else {
        let medians: Vec<f64> = by_window.values().map(|s| s.median).collect();
        Data::new(medians).median()
    };

    BaselineResult {
        value: Some(value),
        by_window,
    }
}
