//! Structural validation of a fully-built plan
//!
//! Every check runs before any failure is raised, so a broken plan reports
//! all of its problems in one pass. The muscle-balance subset is also used
//! on its own as the pre-commit gate in the periodization builder.

use chrono::{Duration, NaiveDate, Weekday};
use std::collections::BTreeSet;

use crate::error::{PlanStructureError, Result};
use crate::models::{MuscleGroup, Plan, Slot};

/// Expected number of weeks in a block
pub const BLOCK_WEEKS: usize = 4;

/// Canonical weekday pattern for strength sessions
pub const TRAINING_DAY_PATTERN: [Weekday; 4] =
    [Weekday::Mon, Weekday::Tue, Weekday::Thu, Weekday::Fri];

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Whole-plan muscle-balance check, returning collected error strings
///
/// All required groups must carry positive set volume and the largest may
/// not exceed the smallest by more than `1 + tolerance`. A missing group
/// makes the ratio infinite and always fails.
pub fn check_muscle_balance(plan: &Plan, tolerance: f64) -> Vec<String> {
    let totals = plan.sets_by_muscle_group();
    let mut errors = Vec::new();

    let mut required_volumes = Vec::new();
    for group in MuscleGroup::REQUIRED {
        match totals.get(&group) {
            Some(&sets) if sets > 0 => required_volumes.push(sets as f64),
            _ => errors.push(format!("no set volume for required muscle group {}", group)),
        }
    }

    if required_volumes.len() == MuscleGroup::REQUIRED.len() {
        let max = required_volumes.iter().cloned().fold(f64::MIN, f64::max);
        let min = required_volumes.iter().cloned().fold(f64::MAX, f64::min);
        let ratio = max / min;
        let allowed = 1.0 + tolerance;
        if ratio > allowed {
            errors.push(format!(
                "muscle balance ratio {:.2} exceeds allowed {:.2} across required groups",
                ratio, allowed
            ));
        }
    }

    errors
}

/// Validate a plan against the structural invariants
///
/// `start_date` is the canonical block start the week dates must align to.
/// Returns a single aggregated [`PlanStructureError`] carrying every failure
/// found.
pub fn validate_plan_structure(plan: &Plan, start_date: NaiveDate, tolerance: f64) -> Result<()> {
    let mut errors = Vec::new();

    if plan.weeks.len() != BLOCK_WEEKS {
        errors.push(format!(
            "expected {} weeks, found {}",
            BLOCK_WEEKS,
            plan.weeks.len()
        ));
    }

    for (index, week) in plan.weeks.iter().enumerate() {
        let position = (index + 1) as u32;
        let label = format!("week {}", position);

        if week.week_number != position {
            errors.push(format!(
                "{}: week_number {} does not match position {}",
                label, week.week_number, position
            ));
        }

        let expected_start = start_date + Duration::days(7 * index as i64);
        if week.start_date != expected_start {
            errors.push(format!(
                "{}: start date {} should be {}",
                label, week.start_date, expected_start
            ));
        }

        if week.workouts.is_empty() {
            errors.push(format!("{}: contains no workouts", label));
            continue;
        }

        // Days carrying at least one non-conditioning workout.
        let training_days: BTreeSet<u8> = week
            .workouts
            .iter()
            .filter(|w| !w.is_conditioning())
            .map(|w| w.day_of_week.number_from_monday() as u8)
            .collect();
        let expected_days: BTreeSet<u8> = TRAINING_DAY_PATTERN
            .iter()
            .map(|d| d.number_from_monday() as u8)
            .collect();

        for &day in &expected_days {
            if !training_days.contains(&day) {
                let name = TRAINING_DAY_PATTERN
                    .iter()
                    .find(|d| d.number_from_monday() as u8 == day)
                    .map(|d| day_name(*d))
                    .unwrap_or("?");
                errors.push(format!("{}: missing training day {}", label, name));
            }
        }
        for day in TRAINING_DAY_PATTERN {
            let iso = day.number_from_monday() as u8;
            if !training_days.contains(&iso) {
                continue;
            }
            let has_main = week
                .workouts
                .iter()
                .any(|w| w.day_of_week == day && w.slot == Slot::Main);
            if !has_main {
                errors.push(format!("{}: no main slot on {}", label, day_name(day)));
            }
        }
        for workout in week.workouts.iter().filter(|w| !w.is_conditioning()) {
            let iso = workout.day_of_week.number_from_monday() as u8;
            if !expected_days.contains(&iso) {
                let msg = format!(
                    "{}: unexpected training day {}",
                    label,
                    day_name(workout.day_of_week)
                );
                if !errors.contains(&msg) {
                    errors.push(msg);
                }
            }
        }
    }

    errors.extend(check_muscle_balance(plan, tolerance));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PlanStructureError::new(errors).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LiftrsError;
    use crate::models::{Intensity, Week, Workout};

    fn start() -> NaiveDate {
        // A Monday.
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    fn workout(day: Weekday, slot: Slot, group: MuscleGroup, sets: u32) -> Workout {
        Workout {
            day_of_week: day,
            exercise_id: 1,
            exercise_name: "Exercise".to_string(),
            sets,
            reps: 8,
            rir: if slot == Slot::Conditioning { None } else { Some(2) },
            focus: "session".to_string(),
            slot,
            muscle_group: group,
            intensity: Intensity::Medium,
        }
    }

    /// Balanced week covering the canonical pattern
    fn balanced_week(week_number: u32, week_start: NaiveDate) -> Week {
        Week {
            week_number,
            intensity: Intensity::Medium,
            start_date: week_start,
            workouts: vec![
                workout(Weekday::Mon, Slot::Main, MuscleGroup::UpperPush, 4),
                workout(Weekday::Tue, Slot::Main, MuscleGroup::Lower, 4),
                workout(Weekday::Thu, Slot::Main, MuscleGroup::UpperPull, 4),
                workout(Weekday::Fri, Slot::Main, MuscleGroup::Lower, 1),
                workout(Weekday::Fri, Slot::Conditioning, MuscleGroup::Conditioning, 1),
            ],
        }
    }

    fn valid_plan() -> Plan {
        Plan {
            start_date: start(),
            weeks: (0..4)
                .map(|i| balanced_week(i as u32 + 1, start() + Duration::days(7 * i)))
                .collect(),
        }
    }

    fn errors_of(result: Result<()>) -> Vec<String> {
        match result {
            Err(LiftrsError::PlanStructure(err)) => err.errors,
            other => panic!("expected structure error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_valid_plan_passes() {
        assert!(validate_plan_structure(&valid_plan(), start(), 0.25).is_ok());
    }

    #[test]
    fn test_wrong_week_count() {
        let mut plan = valid_plan();
        plan.weeks.pop();
        let errors = errors_of(validate_plan_structure(&plan, start(), 0.25));
        assert!(errors.iter().any(|e| e.contains("expected 4 weeks, found 3")));
    }

    #[test]
    fn test_missing_training_day_and_main_slot() {
        let mut plan = valid_plan();
        // Drop Tuesday entirely and demote Thursday's main lift.
        plan.weeks[1]
            .workouts
            .retain(|w| w.day_of_week != Weekday::Tue);
        for w in plan.weeks[1].workouts.iter_mut() {
            if w.day_of_week == Weekday::Thu {
                w.slot = Slot::Secondary;
            }
        }
        let errors = errors_of(validate_plan_structure(&plan, start(), 0.25));
        assert!(errors.iter().any(|e| e.contains("week 2: missing training day Tue")));
        assert!(errors.iter().any(|e| e.contains("week 2: no main slot on Thu")));
    }

    #[test]
    fn test_unexpected_training_day() {
        let mut plan = valid_plan();
        plan.weeks[0].workouts.push(workout(
            Weekday::Wed,
            Slot::Secondary,
            MuscleGroup::Core,
            3,
        ));
        let errors = errors_of(validate_plan_structure(&plan, start(), 0.25));
        assert!(errors.iter().any(|e| e.contains("unexpected training day Wed")));
    }

    #[test]
    fn test_conditioning_only_day_is_not_a_training_day() {
        let mut plan = valid_plan();
        // Conditioning on Saturday must not trip the day-pattern check.
        for week in plan.weeks.iter_mut() {
            week.workouts.push(workout(
                Weekday::Sat,
                Slot::Conditioning,
                MuscleGroup::Conditioning,
                1,
            ));
        }
        assert!(validate_plan_structure(&plan, start(), 0.25).is_ok());
    }

    #[test]
    fn test_misaligned_week_dates_and_numbers() {
        let mut plan = valid_plan();
        plan.weeks[2].week_number = 7;
        plan.weeks[2].start_date = start() + Duration::days(15);
        let errors = errors_of(validate_plan_structure(&plan, start(), 0.25));
        assert!(errors.iter().any(|e| e.contains("week_number 7")));
        assert!(errors.iter().any(|e| e.contains("week 3: start date")));
    }

    #[test]
    fn test_balance_rejects_missing_group() {
        let mut plan = valid_plan();
        for week in plan.weeks.iter_mut() {
            week.workouts
                .retain(|w| w.muscle_group != MuscleGroup::UpperPull);
        }
        let errors = check_muscle_balance(&plan, 0.25);
        assert!(errors.iter().any(|e| e.contains("upper_pull")));
    }

    #[test]
    fn test_balance_rejects_lopsided_volume() {
        let mut plan = valid_plan();
        for week in plan.weeks.iter_mut() {
            for w in week.workouts.iter_mut() {
                if w.muscle_group == MuscleGroup::UpperPush {
                    w.sets = 8;
                }
            }
        }
        // push 32 vs pull 16: ratio 2.0 over the 1.25 allowance.
        let errors = check_muscle_balance(&plan, 0.25);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("muscle balance ratio"));
    }

    #[test]
    fn test_all_errors_reported_together() {
        let mut plan = valid_plan();
        plan.weeks.pop();
        plan.weeks[0].workouts.clear();
        let errors = errors_of(validate_plan_structure(&plan, start(), 0.25));
        assert!(errors.len() >= 2);
        assert!(errors.iter().any(|e| e.contains("expected 4 weeks")));
        assert!(errors.iter().any(|e| e.contains("week 1: contains no workouts")));
    }
}
