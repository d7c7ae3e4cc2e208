//! Training-adherence evaluation for the most recently completed week
//!
//! Compares planned vs. logged per-muscle volume and turns the gap into a
//! directional load adjustment. Under-training reduces next week's load;
//! over-training may increase it, but never while recovery is flagged. RIR
//! shifts belong to the recovery assessor alone.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::data_access::MuscleVolumeRow;
use crate::recovery::Severity;

/// Per-muscle ratio below which the muscle counts as under-trained
pub const LOW_RATIO: f64 = 0.70;

/// Overall ratio above which an increase is requested
pub const HIGH_RATIO: f64 = 1.10;

/// Muscles under [`LOW_RATIO`] required before a reduce fires on that basis
const LOW_MUSCLE_LIMIT: usize = 2;

const REDUCE_MULTIPLIER: f64 = 0.90;
const INCREASE_MULTIPLIER: f64 = 1.05;

/// Directional adherence adjustment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Reduce,
    Increase,
    Maintain,
}

impl Direction {
    pub fn set_multiplier(&self) -> f64 {
        match self {
            Direction::Reduce => REDUCE_MULTIPLIER,
            Direction::Increase => INCREASE_MULTIPLIER,
            Direction::Maintain => 1.0,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Reduce => write!(f, "reduce"),
            Direction::Increase => write!(f, "increase"),
            Direction::Maintain => write!(f, "maintain"),
        }
    }
}

/// Planned vs. actual volume for one muscle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleAdherence {
    pub muscle_id: i64,
    pub planned: f64,
    pub actual: f64,
    pub ratio: f64,
}

/// Full adherence picture for the evaluated prior week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceSnapshot {
    pub plan_id: i64,
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub planned_total: f64,
    pub actual_total: f64,
    pub ratio: f64,
    pub muscles: Vec<MuscleAdherence>,
    pub low_muscles: Vec<i64>,
    pub high_muscles: Vec<i64>,
}

/// Prior-week context resolved by the caller before evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct PriorWeekContext {
    pub plan_id: i64,
    /// Prior week's 1-based number; 0 means the evaluated week is the first
    pub week_number: u32,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub planned: Vec<MuscleVolumeRow>,
    pub actual: Vec<MuscleVolumeRow>,
}

/// Outcome of an adherence evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdherenceAssessment {
    /// Direction actually applied, after any gating
    pub direction: Direction,
    /// Direction the volume data asked for, before gating
    pub requested_direction: Direction,
    /// True when an increase was blocked by non-none recovery severity
    pub increase_gated: bool,
    pub set_multiplier: f64,
    /// Always 0; RIR shifts come from the recovery assessor
    pub rir_adjust: i32,
    pub reasons: Vec<String>,
    pub log_entries: Vec<String>,
    pub snapshot: Option<AdherenceSnapshot>,
}

impl AdherenceAssessment {
    fn maintain(reason: String) -> Self {
        Self {
            direction: Direction::Maintain,
            requested_direction: Direction::Maintain,
            increase_gated: false,
            set_multiplier: 1.0,
            rir_adjust: 0,
            reasons: vec![reason.clone()],
            log_entries: vec![reason],
            snapshot: None,
        }
    }
}

/// Evaluate adherence for the prior week, gated by current recovery severity
pub fn evaluate(context: Option<&PriorWeekContext>, severity: Severity) -> AdherenceAssessment {
    let context = match context {
        Some(context) => context,
        None => {
            return AdherenceAssessment::maintain(
                "No plan context for the evaluated week; maintaining prescribed load".to_string(),
            )
        }
    };

    if context.week_number < 1 {
        return AdherenceAssessment::maintain(
            "First week of the plan, no prior week to review; maintaining prescribed load"
                .to_string(),
        );
    }

    let actual_by_muscle: BTreeMap<i64, f64> = context
        .actual
        .iter()
        .map(|row| (row.muscle_id, row.volume_kg))
        .collect();

    let mut muscles = Vec::new();
    let mut planned_total = 0.0;
    let mut actual_total = 0.0;
    for row in &context.planned {
        if row.volume_kg <= 0.0 {
            continue;
        }
        let actual = actual_by_muscle.get(&row.muscle_id).copied().unwrap_or(0.0);
        planned_total += row.volume_kg;
        actual_total += actual;
        muscles.push(MuscleAdherence {
            muscle_id: row.muscle_id,
            planned: row.volume_kg,
            actual,
            ratio: actual / row.volume_kg,
        });
    }

    if muscles.is_empty() {
        return AdherenceAssessment::maintain(
            "No planned training volume recorded for the prior week; maintaining prescribed load"
                .to_string(),
        );
    }

    let ratio = actual_total / planned_total;
    let low_muscles: Vec<i64> = muscles
        .iter()
        .filter(|m| m.ratio < LOW_RATIO)
        .map(|m| m.muscle_id)
        .collect();
    let high_muscles: Vec<i64> = muscles
        .iter()
        .filter(|m| m.ratio > HIGH_RATIO)
        .map(|m| m.muscle_id)
        .collect();

    let snapshot = AdherenceSnapshot {
        plan_id: context.plan_id,
        week_number: context.week_number,
        week_start: context.week_start,
        week_end: context.week_end,
        planned_total,
        actual_total,
        ratio,
        muscles,
        low_muscles: low_muscles.clone(),
        high_muscles: high_muscles.clone(),
    };

    let mut reasons = Vec::new();
    let mut log_entries = vec![format!(
        "adherence week={} ratio={:.3} planned={:.1} actual={:.1} low={} high={}",
        snapshot.week_number,
        ratio,
        planned_total,
        actual_total,
        low_muscles.len(),
        high_muscles.len()
    )];

    let requested_direction;
    let mut direction;
    let mut increase_gated = false;

    if ratio < LOW_RATIO || low_muscles.len() >= LOW_MUSCLE_LIMIT {
        requested_direction = Direction::Reduce;
        direction = Direction::Reduce;
        if ratio < LOW_RATIO {
            reasons.push(format!(
                "Completed only {:.0}% of planned volume last week; reducing load",
                ratio * 100.0
            ));
        }
        if low_muscles.len() >= LOW_MUSCLE_LIMIT {
            reasons.push(format!(
                "{} muscle groups fell below {:.0}% of plan; reducing load",
                low_muscles.len(),
                LOW_RATIO * 100.0
            ));
        }
    } else if ratio > HIGH_RATIO {
        requested_direction = Direction::Increase;
        direction = Direction::Increase;
        if severity != Severity::None {
            increase_gated = true;
            direction = Direction::Maintain;
            let reason = format!(
                "Volume ran {:.0}% of plan but recovery is {}; holding load instead of increasing",
                ratio * 100.0,
                severity
            );
            log_entries.push(format!("increase gated by severity={}", severity));
            reasons.push(reason);
        } else {
            reasons.push(format!(
                "Completed {:.0}% of planned volume with recovery steady; increasing load",
                ratio * 100.0
            ));
        }
    } else {
        requested_direction = Direction::Maintain;
        direction = Direction::Maintain;
        reasons.push(format!(
            "Completed {:.0}% of planned volume; maintaining prescribed load",
            ratio * 100.0
        ));
    }

    AdherenceAssessment {
        direction,
        requested_direction,
        increase_gated,
        set_multiplier: direction.set_multiplier(),
        rir_adjust: 0,
        reasons,
        log_entries,
        snapshot: Some(snapshot),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(planned: Vec<(i64, f64)>, actual: Vec<(i64, f64)>) -> PriorWeekContext {
        let to_rows = |pairs: Vec<(i64, f64)>| {
            pairs
                .into_iter()
                .map(|(muscle_id, volume_kg)| MuscleVolumeRow {
                    muscle_id,
                    volume_kg,
                })
                .collect()
        };
        PriorWeekContext {
            plan_id: 1,
            week_number: 2,
            week_start: NaiveDate::from_ymd_opt(2025, 6, 23).unwrap(),
            week_end: NaiveDate::from_ymd_opt(2025, 6, 29).unwrap(),
            planned: to_rows(planned),
            actual: to_rows(actual),
        }
    }

    #[test]
    fn test_no_context_maintains() {
        let result = evaluate(None, Severity::None);
        assert_eq!(result.direction, Direction::Maintain);
        assert_eq!(result.set_multiplier, 1.0);
        assert!(result.snapshot.is_none());
        assert!(result.reasons[0].contains("No plan context"));
    }

    #[test]
    fn test_first_week_maintains_with_skip_note() {
        let mut ctx = context(vec![(1, 100.0)], vec![(1, 100.0)]);
        ctx.week_number = 0;
        let result = evaluate(Some(&ctx), Severity::None);
        assert_eq!(result.direction, Direction::Maintain);
        assert!(result.reasons[0].contains("no prior week"));
    }

    #[test]
    fn test_near_plan_volume_maintains() {
        // 205 of 220 planned: ratio ~0.932, nothing under 0.70.
        let ctx = context(vec![(1, 100.0), (2, 120.0)], vec![(1, 90.0), (2, 115.0)]);
        let result = evaluate(Some(&ctx), Severity::None);
        assert_eq!(result.direction, Direction::Maintain);
        assert_eq!(result.set_multiplier, 1.0);
        let snapshot = result.snapshot.unwrap();
        assert!((snapshot.ratio - 205.0 / 220.0).abs() < 1e-9);
        assert!(snapshot.low_muscles.is_empty());
    }

    #[test]
    fn test_low_overall_ratio_reduces() {
        let ctx = context(vec![(1, 100.0), (2, 100.0)], vec![(1, 60.0), (2, 70.0)]);
        let result = evaluate(Some(&ctx), Severity::None);
        assert_eq!(result.direction, Direction::Reduce);
        assert_eq!(result.set_multiplier, 0.90);
        assert_eq!(result.rir_adjust, 0);
    }

    #[test]
    fn test_two_low_muscles_reduce_despite_healthy_total() {
        // Overall ratio 0.78 but two muscles individually under 0.70.
        let ctx = context(
            vec![(1, 100.0), (2, 100.0), (3, 300.0)],
            vec![(1, 50.0), (2, 60.0), (3, 280.0)],
        );
        let result = evaluate(Some(&ctx), Severity::None);
        assert!(result.snapshot.as_ref().unwrap().ratio >= LOW_RATIO);
        assert_eq!(result.direction, Direction::Reduce);
        assert_eq!(result.snapshot.unwrap().low_muscles, vec![1, 2]);
    }

    #[test]
    fn test_high_ratio_increases_when_recovery_steady() {
        let ctx = context(vec![(1, 100.0)], vec![(1, 120.0)]);
        let result = evaluate(Some(&ctx), Severity::None);
        assert_eq!(result.direction, Direction::Increase);
        assert_eq!(result.set_multiplier, 1.05);
        assert!(!result.increase_gated);
    }

    #[test]
    fn test_increase_gated_by_any_nonzero_severity() {
        let ctx = context(vec![(1, 100.0)], vec![(1, 120.0)]);
        for severity in [Severity::Mild, Severity::Moderate, Severity::Severe] {
            let result = evaluate(Some(&ctx), severity);
            assert_eq!(result.requested_direction, Direction::Increase);
            assert_eq!(result.direction, Direction::Maintain);
            assert_eq!(result.set_multiplier, 1.0);
            assert!(result.increase_gated);
            assert!(result.reasons.iter().any(|r| r.contains("holding load")));
        }
    }

    #[test]
    fn test_zero_planned_volume_maintains() {
        let ctx = context(vec![(1, 0.0)], vec![(1, 50.0)]);
        let result = evaluate(Some(&ctx), Severity::None);
        assert_eq!(result.direction, Direction::Maintain);
        assert!(result.snapshot.is_none());
        assert!(result.reasons[0].contains("No planned training volume"));
    }

    #[test]
    fn test_unlogged_muscle_counts_as_zero_actual() {
        let ctx = context(vec![(1, 100.0), (2, 100.0)], vec![(1, 100.0)]);
        let result = evaluate(Some(&ctx), Severity::None);
        let snapshot = result.snapshot.unwrap();
        assert_eq!(snapshot.actual_total, 100.0);
        assert_eq!(snapshot.low_muscles, vec![2]);
    }
}
