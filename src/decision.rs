//! Weekly decision composition and application
//!
//! Merges the recovery back-off and the adherence adjustment into one
//! bounded multiplier/RIR pair, decides whether the change is material, and
//! applies it through the data-access collaborator. A failed write is
//! reported in the decision rather than raised; the recommendation is still
//! useful even when it could not be persisted.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adherence::{self, AdherenceAssessment, Direction, PriorWeekContext};
use crate::config::Settings;
use crate::data_access::DataAccess;
use crate::error::{CalculationError, Result};
use crate::recovery::{self, BackoffRecommendation, ReadinessSummary};

/// Bounds on the composed set multiplier
pub const MULTIPLIER_FLOOR: f64 = 0.60;
pub const MULTIPLIER_CEILING: f64 = 1.20;

/// Multiplier deltas below this are not worth a write
pub const MATERIAL_DELTA: f64 = 0.01;

/// Days of history fetched for the recovery assessment
const HISTORY_DAYS: i64 = 180;

/// Outcome of the single write this decision may perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum WriteOutcome {
    /// No material change; nothing was written
    Skipped,
    Applied,
    Failed { reason: String },
}

/// The composed weekly decision returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationDecision {
    pub needs_backoff: bool,
    pub should_apply: bool,
    pub set_multiplier: f64,
    pub rir_increment: i32,
    pub explanation: String,
    pub log_entries: Vec<String>,
    pub readiness: ReadinessSummary,
    pub recommendation: BackoffRecommendation,
    pub adherence: AdherenceAssessment,
    pub write_outcome: WriteOutcome,
    /// True only after the collaborator confirmed the write
    pub applied: bool,
}

/// Compose the two multipliers into the final bounded value
///
/// Multiplied first, clamped second. When recovery and adherence both
/// reduce, the compound product may hit the floor and end up less of a cut
/// than either signal alone intended; that ordering is deliberate.
pub fn compose_multiplier(recovery: f64, adherence: f64) -> f64 {
    (recovery * adherence).clamp(MULTIPLIER_FLOOR, MULTIPLIER_CEILING)
}

/// Run the recovery assessment for the week starting at `week_start`
pub fn assess_recovery_and_backoff(
    store: &dyn DataAccess,
    week_start: NaiveDate,
    settings: &Settings,
) -> Result<BackoffRecommendation> {
    let end = week_start - Duration::days(1);
    let start = week_start - Duration::days(HISTORY_DAYS);
    let rows = store.get_historical_data(start, end)?;
    if rows.is_empty() {
        return Err(CalculationError::InsufficientData {
            calculation: "recovery assessment".to_string(),
            reason: format!("no metric history between {} and {}", start, end),
        }
        .into());
    }
    Ok(recovery::assess(&rows, week_start, &settings.recovery))
}

/// Resolve the prior-week plan context for adherence evaluation
///
/// Prefers the active plan; falls back to a plan starting exactly at the
/// evaluated week. Returns `None` when no plan covers the week.
fn resolve_prior_week_context(
    store: &dyn DataAccess,
    week_start: NaiveDate,
) -> Result<Option<PriorWeekContext>> {
    let covers = |plan: &crate::data_access::PlanSummary| {
        let offset_days = (week_start - plan.start_date).num_days();
        offset_days >= 0 && offset_days / 7 < plan.weeks as i64
    };

    // An active plan that has already run out (or not started) must not
    // mask a plan beginning exactly at the evaluated week.
    let plan = match store.get_active_plan()?.filter(covers) {
        Some(plan) => Some(plan),
        None => store.find_plan_by_start_date(week_start)?,
    };
    let plan = match plan {
        Some(plan) if covers(&plan) => plan,
        _ => return Ok(None),
    };

    let offset_days = (week_start - plan.start_date).num_days();
    let current_week = (offset_days / 7) as u32 + 1;
    let prior_week = current_week - 1;

    let prior_start = week_start - Duration::days(7);
    let prior_end = week_start - Duration::days(1);

    let (planned, actual) = if prior_week >= 1 {
        (
            store.get_plan_muscle_volume(plan.id, prior_week)?,
            store.get_actual_muscle_volume(prior_start, prior_end)?,
        )
    } else {
        (Vec::new(), Vec::new())
    };

    Ok(Some(PriorWeekContext {
        plan_id: plan.id,
        week_number: prior_week,
        week_start: prior_start,
        week_end: prior_end,
        planned,
        actual,
    }))
}

fn build_explanation(
    week_start: NaiveDate,
    should_apply: bool,
    needs_backoff: bool,
    final_multiplier: f64,
    final_rir: i32,
    recommendation: &BackoffRecommendation,
    adherence: &AdherenceAssessment,
) -> String {
    if !should_apply {
        let mut explanation =
            "Recovery is within baseline; keeping the week as prescribed.".to_string();
        if adherence.requested_direction != Direction::Maintain {
            if let Some(note) = adherence.reasons.first() {
                explanation.push(' ');
                explanation.push_str(note);
            }
        }
        return explanation;
    }

    if needs_backoff {
        format!(
            "Backing off week of {}: sets x{:.2}, RIR +{} ({} recovery dip)",
            week_start, final_multiplier, final_rir, recommendation.severity
        )
    } else {
        match adherence.direction {
            Direction::Reduce => format!(
                "Reducing week of {} to sets x{:.2} after low adherence last week",
                week_start, final_multiplier
            ),
            Direction::Increase => format!(
                "Increasing week of {} to sets x{:.2} after strong adherence last week",
                week_start, final_multiplier
            ),
            Direction::Maintain => format!(
                "Adjusting week of {} to sets x{:.2}",
                week_start, final_multiplier
            ),
        }
    }
}

/// Evaluate recovery and adherence for a week and apply the result
pub fn validate_and_adjust_plan(
    store: &dyn DataAccess,
    week_start: NaiveDate,
    settings: &Settings,
) -> Result<ValidationDecision> {
    let recommendation = assess_recovery_and_backoff(store, week_start, settings)?;
    let context = resolve_prior_week_context(store, week_start)?;
    let adherence = adherence::evaluate(context.as_ref(), recommendation.severity);

    let final_multiplier =
        compose_multiplier(recommendation.set_multiplier, adherence.set_multiplier);
    let final_rir = recommendation.rir_increment + adherence.rir_adjust;
    let should_apply = recommendation.needs_backoff
        || (final_multiplier - 1.0).abs() >= MATERIAL_DELTA
        || final_rir != 0;

    let mut log_entries = Vec::new();
    if recommendation.needs_backoff {
        log_entries.push(format!(
            "recovery severity={} set_multiplier={:.2} rir_increment={}",
            recommendation.severity, recommendation.set_multiplier, recommendation.rir_increment
        ));
        log_entries.extend(recommendation.reasons.iter().cloned());
    }
    log_entries.extend(adherence.log_entries.iter().cloned());

    let explanation = build_explanation(
        week_start,
        should_apply,
        recommendation.needs_backoff,
        final_multiplier,
        final_rir,
        &recommendation,
        &adherence,
    );

    let write_outcome = if should_apply {
        match store.apply_plan_backoff(week_start, final_multiplier, final_rir) {
            Ok(()) => {
                info!(
                    week_start = %week_start,
                    set_multiplier = final_multiplier,
                    rir_increment = final_rir,
                    "weekly adjustment applied"
                );
                WriteOutcome::Applied
            }
            Err(err) => {
                warn!(week_start = %week_start, error = %err, "weekly adjustment write failed");
                log_entries.push(format!("apply_plan_backoff failed: {}", err));
                WriteOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    } else {
        WriteOutcome::Skipped
    };

    let readiness = ReadinessSummary::from_recommendation(&recommendation);
    let applied = write_outcome == WriteOutcome::Applied;

    Ok(ValidationDecision {
        needs_backoff: recommendation.needs_backoff,
        should_apply,
        set_multiplier: final_multiplier,
        rir_increment: final_rir,
        explanation,
        log_entries,
        readiness,
        recommendation,
        adherence,
        write_outcome,
        applied,
    })
}
