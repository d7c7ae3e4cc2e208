//! Recovery-breach assessment and back-off recommendation
//!
//! Compares the last seven days of resting heart rate, sleep and HRV against
//! their rolling baselines and maps the worst breach onto a severity tier.
//! Each tier carries a set multiplier and an RIR increment for the upcoming
//! week. The assessment is a pure function of the fetched rows; the decision
//! composer owns the write.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::baseline::{compute_baseline, BaselineResult};
use crate::config::RecoveryThresholds;
use crate::data_access::MetricRow;

/// Metric key for resting heart rate, beats per minute
pub const RHR_KEY: &str = "hr_resting";

/// Metric key for nightly sleep, minutes
pub const SLEEP_KEY: &str = "sleep_total_minutes";

/// Recognized HRV keys, most specific first; the first one present in the
/// data wins. Providers disagree on which variant they export.
pub const HRV_ALIASES: [&str; 4] = ["hrv_sdnn_ms", "hrv_rmssd_ms", "hrv_ms", "hrv"];

/// Days averaged for the "recent" side of the comparison
const RECENT_WINDOW_DAYS: i64 = 7;

/// Minimum non-missing points for a recent average to count
const MIN_RECENT_SAMPLES: usize = 4;

/// Breach ratios below this are floating-point residue, not a breach
const RATIO_NOISE_FLOOR: f64 = 1e-9;

/// Severity tier of a recovery breach
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Map an overall breach ratio onto a tier
    ///
    /// A ratio of exactly 1.0 (right at the allowed deviation) is mild, not
    /// moderate; the boundaries are inclusive on the low side of each tier.
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio <= 0.0 {
            Severity::None
        } else if ratio <= 1.0 {
            Severity::Mild
        } else if ratio <= 2.0 {
            Severity::Moderate
        } else {
            Severity::Severe
        }
    }

    pub fn set_multiplier(&self) -> f64 {
        match self {
            Severity::None => 1.00,
            Severity::Mild => 0.90,
            Severity::Moderate => 0.80,
            Severity::Severe => 0.70,
        }
    }

    pub fn rir_increment(&self) -> i32 {
        match self {
            Severity::None => 0,
            Severity::Mild => 1,
            Severity::Moderate => 2,
            Severity::Severe => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::None => write!(f, "none"),
            Severity::Mild => write!(f, "mild"),
            Severity::Moderate => write!(f, "moderate"),
            Severity::Severe => write!(f, "severe"),
        }
    }
}

/// Per-metric diagnostics kept for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDiagnostics {
    pub recent_avg: Option<f64>,
    pub baseline: Option<f64>,
    pub allowed_fraction: f64,
    pub breach_ratio: f64,
}

/// The recovery assessor's output for one evaluated week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffRecommendation {
    pub needs_backoff: bool,
    pub severity: Severity,
    pub reasons: Vec<String>,
    pub set_multiplier: f64,
    pub rir_increment: i32,
    pub metrics: BTreeMap<String, MetricDiagnostics>,
}

impl BackoffRecommendation {
    pub fn steady() -> Self {
        Self {
            needs_backoff: false,
            severity: Severity::None,
            reasons: Vec::new(),
            set_multiplier: 1.0,
            rir_increment: 0,
            metrics: BTreeMap::new(),
        }
    }
}

/// Readiness state derived from the recovery severity, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadinessState {
    Ready,
    Lagging,
    Low,
    Critical,
}

impl fmt::Display for ReadinessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadinessState::Ready => write!(f, "ready"),
            ReadinessState::Lagging => write!(f, "lagging"),
            ReadinessState::Low => write!(f, "low"),
            ReadinessState::Critical => write!(f, "critical"),
        }
    }
}

/// Display summary built from a [`BackoffRecommendation`]
///
/// Independent of whether any adjustment was applied; this is what a
/// notification layer would show the athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadinessSummary {
    pub state: ReadinessState,
    pub headline: String,
    pub tip: String,
}

impl ReadinessSummary {
    pub fn from_recommendation(recommendation: &BackoffRecommendation) -> Self {
        let state = match recommendation.severity {
            Severity::None => ReadinessState::Ready,
            Severity::Mild => ReadinessState::Lagging,
            Severity::Moderate => ReadinessState::Low,
            Severity::Severe => ReadinessState::Critical,
        };
        let headline = if recommendation.severity == Severity::None {
            "Recovery steady".to_string()
        } else {
            format!("Recovery dip detected ({})", recommendation.severity)
        };
        let tip = coaching_tip(recommendation);
        Self {
            state,
            headline,
            tip,
        }
    }
}

/// Pick a coaching tip keyed off the dominant breach reason
fn coaching_tip(recommendation: &BackoffRecommendation) -> String {
    let dominant = recommendation.reasons.first().map(String::as_str).unwrap_or("");
    if dominant.contains("sleep") {
        "Prioritize an earlier night; keep sessions as prescribed but stop sets at the adjusted RIR.".to_string()
    } else if dominant.contains("heart rate") || dominant.contains("HRV") {
        "Keep intensity easy and monitor morning readings before adding load back.".to_string()
    } else {
        "Train as planned and keep logging your morning metrics.".to_string()
    }
}

/// Resolve the HRV series key actually present in the rows
pub fn resolve_hrv_key(rows: &[MetricRow]) -> Option<&'static str> {
    HRV_ALIASES
        .iter()
        .find(|key| rows.iter().any(|row| row.get(key).is_some()))
        .copied()
}

/// Extract one metric's series as (date, value) pairs
fn metric_series(rows: &[MetricRow], key: &str) -> Vec<(NaiveDate, f64)> {
    rows.iter()
        .filter_map(|row| row.get(key).map(|value| (row.date, value)))
        .collect()
}

/// Simple mean of the most recent complete days ending at `end`
///
/// Zero values count as missing, matching the baseline estimator. Returns
/// `None` below [`MIN_RECENT_SAMPLES`] usable points.
fn recent_average(series: &[(NaiveDate, f64)], end: NaiveDate) -> Option<f64> {
    let start = end - Duration::days(RECENT_WINDOW_DAYS - 1);
    let values: Vec<f64> = series
        .iter()
        .filter(|(date, value)| *date >= start && *date <= end && *value != 0.0)
        .map(|(_, value)| *value)
        .collect();
    if values.len() < MIN_RECENT_SAMPLES {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Direction a breach moves relative to baseline
enum BreachDirection {
    /// Higher than baseline is bad (resting HR)
    IncreaseIsBad,
    /// Lower than baseline is bad (sleep, HRV)
    DecreaseIsBad,
}

/// Breach ratio for one metric: how far the recent average exceeds its
/// allowed deviation, as a multiple of that allowance. 1.0 means exactly at
/// the threshold. Missing data contributes 0 rather than blocking the
/// assessment.
fn breach_ratio(
    recent_avg: Option<f64>,
    baseline: Option<f64>,
    allowed_fraction: f64,
    direction: BreachDirection,
) -> f64 {
    let (recent, base) = match (recent_avg, baseline) {
        (Some(recent), Some(base)) if base > 0.0 && allowed_fraction > 0.0 => (recent, base),
        _ => return 0.0,
    };
    let excess = match direction {
        BreachDirection::IncreaseIsBad => (recent - base) / base,
        BreachDirection::DecreaseIsBad => (base - recent) / base,
    };
    let ratio = (excess / allowed_fraction).max(0.0);
    if ratio < RATIO_NOISE_FLOOR {
        0.0
    } else {
        ratio
    }
}

struct MetricAssessment {
    diagnostics: MetricDiagnostics,
    reason: Option<String>,
}

fn assess_metric(
    rows: &[MetricRow],
    key: &str,
    end: NaiveDate,
    allowed_fraction: f64,
    direction: BreachDirection,
    describe: impl Fn(f64, f64, f64) -> String,
) -> MetricAssessment {
    let series = metric_series(rows, key);
    let baseline: BaselineResult = compute_baseline(&series, end, true);
    let recent_avg = recent_average(&series, end);
    let ratio = breach_ratio(recent_avg, baseline.value, allowed_fraction, direction);

    let reason = if ratio > 0.0 {
        // A positive ratio requires both values present.
        match (recent_avg, baseline.value) {
            (Some(recent), Some(base)) => Some(describe(recent, base, ratio)),
            _ => None,
        }
    } else {
        None
    };

    MetricAssessment {
        diagnostics: MetricDiagnostics {
            recent_avg,
            baseline: baseline.value,
            allowed_fraction,
            breach_ratio: ratio,
        },
        reason,
    }
}

/// Assess recovery for the week starting at `week_start`
///
/// `rows` should cover at least 180 days ending the day before `week_start`;
/// shorter histories degrade gracefully (windows drop out, missing metrics
/// contribute no breach).
pub fn assess(
    rows: &[MetricRow],
    week_start: NaiveDate,
    thresholds: &RecoveryThresholds,
) -> BackoffRecommendation {
    let end = week_start - Duration::days(1);
    let mut metrics = BTreeMap::new();
    let mut reasons = Vec::new();

    let rhr = assess_metric(
        rows,
        RHR_KEY,
        end,
        thresholds.rhr_allowed_increase,
        BreachDirection::IncreaseIsBad,
        |recent, base, ratio| {
            format!(
                "Resting heart rate {:.1} bpm vs baseline {:.1} bpm ({:.2}x allowed increase)",
                recent, base, ratio
            )
        },
    );
    reasons.extend(rhr.reason.clone());
    metrics.insert(RHR_KEY.to_string(), rhr.diagnostics.clone());

    let sleep = assess_metric(
        rows,
        SLEEP_KEY,
        end,
        thresholds.sleep_allowed_decrease,
        BreachDirection::DecreaseIsBad,
        |recent, base, ratio| {
            format!(
                "Nightly sleep {:.0} min vs baseline {:.0} min ({:.2}x allowed decrease)",
                recent, base, ratio
            )
        },
    );
    reasons.extend(sleep.reason.clone());
    metrics.insert(SLEEP_KEY.to_string(), sleep.diagnostics.clone());

    let mut hrv_ratio = 0.0;
    if let Some(hrv_key) = resolve_hrv_key(rows) {
        let hrv = assess_metric(
            rows,
            hrv_key,
            end,
            thresholds.hrv_allowed_decrease,
            BreachDirection::DecreaseIsBad,
            |recent, base, ratio| {
                format!(
                    "HRV {:.1} ms vs baseline {:.1} ms ({:.2}x allowed decrease)",
                    recent, base, ratio
                )
            },
        );
        reasons.extend(hrv.reason.clone());
        hrv_ratio = hrv.diagnostics.breach_ratio;
        metrics.insert(hrv_key.to_string(), hrv.diagnostics);
    }

    let overall_ratio = rhr
        .diagnostics
        .breach_ratio
        .max(sleep.diagnostics.breach_ratio)
        .max(hrv_ratio);
    let severity = Severity::from_ratio(overall_ratio);

    tracing::debug!(
        week_start = %week_start,
        overall_ratio,
        severity = %severity,
        "recovery assessment complete"
    );

    BackoffRecommendation {
        needs_backoff: severity != Severity::None,
        severity,
        reasons,
        set_multiplier: severity.set_multiplier(),
        rir_increment: severity.rir_increment(),
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    /// Daily rows ending the day before `week_start`, with a recent override
    /// for the final `recent_days` days
    fn rhr_history(
        week_start: NaiveDate,
        baseline_value: f64,
        recent_value: f64,
        recent_days: i64,
    ) -> Vec<MetricRow> {
        let end = week_start - Duration::days(1);
        (0..180)
            .map(|offset| {
                let value = if offset < recent_days {
                    recent_value
                } else {
                    baseline_value
                };
                MetricRow::new(end - Duration::days(offset)).with_metric(RHR_KEY, value)
            })
            .collect()
    }

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(Severity::from_ratio(0.0), Severity::None);
        assert_eq!(Severity::from_ratio(-0.5), Severity::None);
        assert_eq!(Severity::from_ratio(0.01), Severity::Mild);
        assert_eq!(Severity::from_ratio(1.0), Severity::Mild);
        assert_eq!(Severity::from_ratio(1.01), Severity::Moderate);
        assert_eq!(Severity::from_ratio(2.0), Severity::Moderate);
        assert_eq!(Severity::from_ratio(2.01), Severity::Severe);
    }

    #[test]
    fn test_recent_equal_to_baseline_is_no_breach() {
        let week_start = date(2025, 7, 7);
        let rows = rhr_history(week_start, 50.0, 50.0, 7);
        let rec = assess(&rows, week_start, &RecoveryThresholds::default());
        assert!(!rec.needs_backoff);
        assert_eq!(rec.severity, Severity::None);
        assert_eq!(rec.set_multiplier, 1.0);
        assert_eq!(rec.rir_increment, 0);
        assert_eq!(rec.metrics[RHR_KEY].breach_ratio, 0.0);
        assert!(rec.reasons.is_empty());
    }

    #[test]
    fn test_rhr_at_exact_allowance_is_mild() {
        // Baseline 50 bpm, recent week averages 55 bpm, allowed increase 10%:
        // excess 10% of baseline, exactly 1.0x the allowance.
        let week_start = date(2025, 7, 7);
        let rows = rhr_history(week_start, 50.0, 55.0, 7);
        let rec = assess(&rows, week_start, &RecoveryThresholds::default());

        let diag = &rec.metrics[RHR_KEY];
        assert_eq!(diag.recent_avg, Some(55.0));
        // Every window's median stays 50: 7 elevated days out of 30+.
        assert_eq!(diag.baseline, Some(50.0));
        assert!((diag.breach_ratio - 1.0).abs() < 1e-9);
        assert_eq!(rec.severity, Severity::Mild);
        assert_eq!(rec.set_multiplier, 0.90);
        assert_eq!(rec.rir_increment, 1);
        assert_eq!(rec.reasons.len(), 1);
        assert!(rec.reasons[0].contains("Resting heart rate"));
    }

    #[test]
    fn test_flat_history_on_all_metrics_reads_exactly_steady() {
        // 180 flat days of both metrics: every breach ratio must be exactly
        // zero, with no floating-point residue promoting the week to mild.
        let week_start = date(2025, 7, 7);
        let end = week_start - Duration::days(1);
        let rows: Vec<MetricRow> = (0..180)
            .map(|offset| {
                MetricRow::new(end - Duration::days(offset))
                    .with_metric(RHR_KEY, 50.0)
                    .with_metric(SLEEP_KEY, 450.0)
            })
            .collect();
        let rec = assess(&rows, week_start, &RecoveryThresholds::default());
        assert_eq!(rec.severity, Severity::None);
        assert!(!rec.needs_backoff);
        assert_eq!(rec.metrics[RHR_KEY].breach_ratio, 0.0);
        assert_eq!(rec.metrics[SLEEP_KEY].breach_ratio, 0.0);
        assert_eq!(rec.metrics[RHR_KEY].baseline, Some(50.0));
        assert_eq!(rec.metrics[SLEEP_KEY].baseline, Some(450.0));
    }

    #[test]
    fn test_sleep_decrease_breaches() {
        let week_start = date(2025, 7, 7);
        let end = week_start - Duration::days(1);
        let rows: Vec<MetricRow> = (0..180)
            .map(|offset| {
                let value = if offset < 7 { 300.0 } else { 450.0 };
                MetricRow::new(end - Duration::days(offset)).with_metric(SLEEP_KEY, value)
            })
            .collect();
        let rec = assess(&rows, week_start, &RecoveryThresholds::default());
        // Excess (450-300)/450 = 1/3, over 0.10 allowance: ratio > 2.
        assert_eq!(rec.severity, Severity::Severe);
        assert!(rec.reasons[0].contains("sleep"));
    }

    #[test]
    fn test_hrv_alias_resolution_prefers_first_present() {
        let rows = vec![
            MetricRow::new(date(2025, 7, 1)).with_metric("hrv", 45.0),
            MetricRow::new(date(2025, 7, 2)).with_metric("hrv_rmssd_ms", 50.0),
        ];
        assert_eq!(resolve_hrv_key(&rows), Some("hrv_rmssd_ms"));
        assert_eq!(resolve_hrv_key(&[]), None);
    }

    #[test]
    fn test_missing_metric_contributes_no_breach() {
        // RHR only; sleep and HRV absent entirely.
        let week_start = date(2025, 7, 7);
        let rows = rhr_history(week_start, 50.0, 50.0, 7);
        let rec = assess(&rows, week_start, &RecoveryThresholds::default());
        assert_eq!(rec.severity, Severity::None);
        assert_eq!(rec.metrics[SLEEP_KEY].breach_ratio, 0.0);
        assert!(rec.metrics[SLEEP_KEY].recent_avg.is_none());
    }

    #[test]
    fn test_too_few_recent_points_means_no_recent_average() {
        let week_start = date(2025, 7, 7);
        let end = week_start - Duration::days(1);
        // Long flat history but only 3 points in the final week.
        let mut rows: Vec<MetricRow> = (10..180)
            .map(|offset| MetricRow::new(end - Duration::days(offset)).with_metric(RHR_KEY, 50.0))
            .collect();
        for offset in 0..3 {
            rows.push(MetricRow::new(end - Duration::days(offset)).with_metric(RHR_KEY, 70.0));
        }
        let rec = assess(&rows, week_start, &RecoveryThresholds::default());
        assert!(rec.metrics[RHR_KEY].recent_avg.is_none());
        assert_eq!(rec.metrics[RHR_KEY].breach_ratio, 0.0);
    }

    #[test]
    fn test_readiness_summary_maps_severity() {
        let mut rec = BackoffRecommendation::steady();
        let summary = ReadinessSummary::from_recommendation(&rec);
        assert_eq!(summary.state, ReadinessState::Ready);
        assert_eq!(summary.headline, "Recovery steady");

        rec.severity = Severity::Moderate;
        rec.needs_backoff = true;
        rec.reasons = vec!["Nightly sleep 300 min vs baseline 450 min (3.33x allowed decrease)"
            .to_string()];
        let summary = ReadinessSummary::from_recommendation(&rec);
        assert_eq!(summary.state, ReadinessState::Low);
        assert!(summary.headline.contains("moderate"));
        assert!(summary.tip.contains("earlier night"));
    }
}
