//! Per-exercise working-weight progression
//!
//! Calibrates a plan week's weight targets from recent lift history and a
//! coarse recovery flag. Runs independently of the weekly back-off decision;
//! the two serialize through the data-access collaborator's writes.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::data_access::{DataAccess, LiftLogEntry, MetricRow, TargetUpdate, WorkoutRow};
use crate::error::{CalculationError, Result};
use crate::recovery::{self, RHR_KEY, SLEEP_KEY};

/// Logged sets considered per exercise
const RECENT_SETS: usize = 4;

/// Average RIR at or below which the lifter is grinding hard
const LOW_RIR: f64 = 1.0;

/// Average RIR at or above which the lifter left plenty in the tank
const HIGH_RIR: f64 = 2.0;

/// One applied weight change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutProgression {
    pub workout_id: i64,
    pub exercise_id: i64,
    pub name: String,
    pub before: f64,
    pub after: f64,
}

/// Outcome of the optional batch persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PersistOutcome {
    /// Persistence not requested or nothing to write
    Skipped,
    Persisted,
    Failed { reason: String },
}

/// Calibration result for one plan week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanProgressionDecision {
    pub plan_id: i64,
    pub week_number: u32,
    pub recovery_good: bool,
    /// Only exercises whose target actually moved
    pub progressions: Vec<WorkoutProgression>,
    /// One note per evaluated exercise, changed or not
    pub notes: Vec<String>,
    pub persist_outcome: PersistOutcome,
    pub persisted: bool,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Collapse the recovery picture to a single flag
///
/// True unless the 7-day resting HR or sleep average breaches its allowed
/// deviation from baseline (breach ratio above 1.0). Missing history reads
/// as good; progression should not stall on data gaps.
pub fn recovery_flag(rows: &[MetricRow], as_of: NaiveDate, settings: &Settings) -> bool {
    if rows.is_empty() {
        return true;
    }
    let recommendation = recovery::assess(rows, as_of, &settings.recovery);
    let breached = |key: &str| {
        recommendation
            .metrics
            .get(key)
            .map(|diag| diag.breach_ratio > 1.0)
            .unwrap_or(false)
    };
    !(breached(RHR_KEY) || breached(SLEEP_KEY))
}

struct ExerciseDecision {
    after: Option<f64>,
    note: String,
}

/// Decide one exercise's new target from its recent sets
fn progress_exercise(
    name: &str,
    target: f64,
    entries: &[LiftLogEntry],
    recovery_good: bool,
    settings: &Settings,
) -> ExerciseDecision {
    let recent: Vec<&LiftLogEntry> = entries.iter().rev().take(RECENT_SETS).collect();
    let weights: Vec<f64> = recent.iter().filter_map(|e| e.weight_kg).collect();
    if weights.is_empty() {
        return ExerciseDecision {
            after: None,
            note: format!("{}: kept at {:.2} kg, no logged history", name, target),
        };
    }
    let avg_weight = weights.iter().sum::<f64>() / weights.len() as f64;

    let rirs: Vec<f64> = recent.iter().filter_map(|e| e.rir).collect();
    let avg_rir = if rirs.is_empty() {
        None
    } else {
        Some(rirs.iter().sum::<f64>() / rirs.len() as f64)
    };

    let mut increment = settings.progression.increment;
    let mut decrement = settings.progression.decrement;
    if let Some(avg_rir) = avg_rir {
        if avg_rir <= LOW_RIR {
            increment *= 1.5;
        } else if avg_rir >= HIGH_RIR {
            increment /= 2.0;
        }
    }
    if !recovery_good {
        increment /= 2.0;
        decrement *= 1.5;
    }

    let hit_target = avg_weight >= target;
    let rir_allows_progress = avg_rir.map(|r| r <= HIGH_RIR).unwrap_or(true);
    let rir_forces_regress = avg_rir.map(|r| r > HIGH_RIR).unwrap_or(false);

    if hit_target && rir_allows_progress {
        let after = round2(target * (1.0 + increment));
        ExerciseDecision {
            note: format!(
                "{}: progressed {:.2} -> {:.2} kg (avg {:.2} kg over {} sets)",
                name,
                target,
                after,
                avg_weight,
                weights.len()
            ),
            after: Some(after),
        }
    } else if !hit_target || rir_forces_regress {
        let after = round2(target * (1.0 - decrement));
        ExerciseDecision {
            note: format!(
                "{}: regressed {:.2} -> {:.2} kg (avg {:.2} kg over {} sets)",
                name,
                target,
                after,
                avg_weight,
                weights.len()
            ),
            after: Some(after),
        }
    } else {
        ExerciseDecision {
            after: None,
            note: format!("{}: kept at {:.2} kg", name, target),
        }
    }
}

/// Calibrate weight targets for one plan week
///
/// `as_of` anchors the recovery comparison window; callers pass the current
/// date so the core itself never reads the clock. With `persist` set, all
/// changed targets are written in one batch followed by a plan-view
/// refresh; a failure in either step is reported in the result instead of
/// raised.
pub fn calibrate_plan_week(
    store: &dyn DataAccess,
    plan_id: i64,
    week_number: u32,
    as_of: NaiveDate,
    persist: bool,
    settings: &Settings,
) -> Result<PlanProgressionDecision> {
    let rows = store.get_plan_week(plan_id, week_number)?;
    if rows.is_empty() {
        return Err(CalculationError::InsufficientData {
            calculation: "plan-week calibration".to_string(),
            reason: format!("no workout rows for plan {} week {}", plan_id, week_number),
        }
        .into());
    }

    let history = store.get_historical_data(as_of - Duration::days(180), as_of - Duration::days(1))?;
    let recovery_good = recovery_flag(&history, as_of, settings);

    let lift_rows: Vec<&WorkoutRow> = rows.iter().filter(|r| !r.is_conditioning).collect();
    let exercise_ids: Vec<i64> = lift_rows.iter().map(|r| r.exercise_id).collect();
    let lift_log = store.load_lift_log(&exercise_ids)?;

    let mut progressions = Vec::new();
    let mut notes = Vec::new();

    for row in &lift_rows {
        let name = row
            .exercise_name
            .clone()
            .unwrap_or_else(|| format!("exercise {}", row.exercise_id));
        let target = match row.target_weight_kg {
            Some(target) => target,
            None => {
                notes.push(format!("{}: no weight target to calibrate", name));
                continue;
            }
        };
        let entries = lift_log
            .get(&row.exercise_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let decision = progress_exercise(&name, target, entries, recovery_good, settings);
        notes.push(decision.note);
        if let Some(after) = decision.after {
            if (after - target).abs() > 1e-9 {
                progressions.push(WorkoutProgression {
                    workout_id: row.id,
                    exercise_id: row.exercise_id,
                    name,
                    before: target,
                    after,
                });
            }
        }
    }

    let persist_outcome = if persist && !progressions.is_empty() {
        let updates: Vec<TargetUpdate> = progressions
            .iter()
            .map(|p| TargetUpdate {
                workout_id: p.workout_id,
                target_weight_kg: p.after,
            })
            .collect();
        match store
            .update_workout_targets(&updates)
            .and_then(|_| store.refresh_plan_view())
        {
            Ok(()) => {
                info!(
                    plan_id,
                    week_number,
                    updates = updates.len(),
                    "weight targets persisted"
                );
                PersistOutcome::Persisted
            }
            Err(err) => {
                warn!(plan_id, week_number, error = %err, "weight target persist failed");
                notes.push(format!("persist failed: {}", err));
                PersistOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    } else {
        PersistOutcome::Skipped
    };

    let persisted = persist_outcome == PersistOutcome::Persisted;

    Ok(PlanProgressionDecision {
        plan_id,
        week_number,
        recovery_good,
        progressions,
        notes,
        persist_outcome,
        persisted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_access::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn workout_row(id: i64, exercise_id: i64, target: Option<f64>) -> WorkoutRow {
        WorkoutRow {
            id,
            exercise_id,
            exercise_name: Some(format!("Lift {}", exercise_id)),
            day_of_week: 1,
            sets: 4,
            reps: 6,
            rir: Some(2.0),
            target_weight_kg: target,
            is_conditioning: false,
        }
    }

    fn log_entries(weight: f64, rir: Option<f64>, count: usize) -> Vec<LiftLogEntry> {
        (0..count)
            .map(|i| LiftLogEntry {
                date: date(2025, 6, 1) + Duration::days(i as i64),
                weight_kg: Some(weight),
                reps: 6,
                rir,
            })
            .collect()
    }

    fn settings() -> Settings {
        Settings::default()
    }

    #[test]
    fn test_pure_weight_progress_without_rir() {
        // At target for 4 sets, no RIR logged, recovery good: plain 5% jump.
        let decision = progress_exercise("Bench", 100.0, &log_entries(100.0, None, 4), true, &settings());
        assert_eq!(decision.after, Some(105.0));
    }

    #[test]
    fn test_low_rir_boosts_increment() {
        let decision = progress_exercise("Bench", 100.0, &log_entries(100.0, Some(1.0), 4), true, &settings());
        assert_eq!(decision.after, Some(107.5));
    }

    #[test]
    fn test_high_rir_halves_increment_but_still_progresses() {
        let decision = progress_exercise("Bench", 100.0, &log_entries(100.0, Some(2.0), 4), true, &settings());
        assert_eq!(decision.after, Some(102.5));
    }

    #[test]
    fn test_below_target_regresses() {
        let decision = progress_exercise("Squat", 100.0, &log_entries(90.0, None, 4), true, &settings());
        assert_eq!(decision.after, Some(95.0));
    }

    #[test]
    fn test_excess_rir_regresses_even_at_target() {
        let decision = progress_exercise("Squat", 100.0, &log_entries(100.0, Some(3.0), 4), true, &settings());
        assert_eq!(decision.after, Some(95.0));
    }

    #[test]
    fn test_poor_recovery_dampens_both_directions() {
        let progressed =
            progress_exercise("Bench", 100.0, &log_entries(100.0, None, 4), false, &settings());
        assert_eq!(progressed.after, Some(102.5));

        let regressed =
            progress_exercise("Squat", 100.0, &log_entries(90.0, None, 4), false, &settings());
        assert_eq!(regressed.after, Some(92.5));
    }

    #[test]
    fn test_only_last_four_sets_count() {
        let mut entries = log_entries(80.0, None, 10);
        entries.extend(log_entries(100.0, None, 4));
        let decision = progress_exercise("Bench", 100.0, &entries, true, &settings());
        assert_eq!(decision.after, Some(105.0));
    }

    #[test]
    fn test_no_history_keeps_target() {
        let decision = progress_exercise("Bench", 100.0, &[], true, &settings());
        assert_eq!(decision.after, None);
        assert!(decision.note.contains("no logged history"));
    }

    #[test]
    fn test_recovery_flag_breach() {
        let as_of = date(2025, 7, 7);
        let end = as_of - Duration::days(1);
        let rows: Vec<MetricRow> = (0..180)
            .map(|offset| {
                let rhr = if offset < 7 { 60.0 } else { 50.0 };
                MetricRow::new(end - Duration::days(offset))
                    .with_metric(RHR_KEY, rhr)
                    .with_metric(SLEEP_KEY, 450.0)
            })
            .collect();
        // 20% over baseline against a 10% allowance: ratio 2.0, flag drops.
        assert!(!recovery_flag(&rows, as_of, &settings()));
        assert!(recovery_flag(&[], as_of, &settings()));
    }

    #[test]
    fn test_empty_plan_week_is_fatal() {
        let store = MemoryStore::new();
        let result = calibrate_plan_week(&store, 1, 1, date(2025, 7, 7), false, &settings());
        assert!(result.is_err());
    }

    #[test]
    fn test_calibration_persists_changed_targets() {
        let store = MemoryStore::new();
        store.add_plan_week(
            1,
            2,
            vec![
                workout_row(11, 101, Some(100.0)),
                workout_row(12, 201, Some(80.0)),
                workout_row(13, 301, None),
            ],
        );
        store.add_lift_log(101, log_entries(100.0, None, 4));
        store.add_lift_log(201, log_entries(70.0, None, 4));

        let decision =
            calibrate_plan_week(&store, 1, 2, date(2025, 7, 7), true, &settings()).unwrap();
        assert!(decision.recovery_good);
        assert_eq!(decision.progressions.len(), 2);
        assert!(decision.persisted);
        assert_eq!(decision.persist_outcome, PersistOutcome::Persisted);
        assert_eq!(decision.notes.len(), 3);

        let rows = store.get_plan_week(1, 2).unwrap();
        assert_eq!(rows[0].target_weight_kg, Some(105.0));
        assert_eq!(rows[1].target_weight_kg, Some(76.0));
        assert_eq!(store.refresh_count(), 1);
        assert_eq!(store.target_update_batches().len(), 1);
    }

    #[test]
    fn test_persist_failure_reported_not_raised() {
        let store = MemoryStore::new();
        store.add_plan_week(1, 2, vec![workout_row(11, 101, Some(100.0))]);
        store.add_lift_log(101, log_entries(100.0, None, 4));
        store.fail_target_updates.set(true);

        let decision =
            calibrate_plan_week(&store, 1, 2, date(2025, 7, 7), true, &settings()).unwrap();
        assert!(!decision.persisted);
        assert!(matches!(decision.persist_outcome, PersistOutcome::Failed { .. }));
        assert!(decision.notes.iter().any(|n| n.contains("persist failed")));
        assert_eq!(decision.progressions.len(), 1);
    }

    #[test]
    fn test_unchanged_week_skips_persist() {
        let store = MemoryStore::new();
        store.add_plan_week(1, 2, vec![workout_row(11, 101, Some(100.0))]);
        // No lift log at all: nothing changes, nothing written.
        let decision =
            calibrate_plan_week(&store, 1, 2, date(2025, 7, 7), true, &settings()).unwrap();
        assert!(decision.progressions.is_empty());
        assert_eq!(decision.persist_outcome, PersistOutcome::Skipped);
        assert_eq!(store.target_update_batches().len(), 0);
    }
}
