//! Data-access seam between the decision engine and external storage
//!
//! The core never talks to a database directly. Everything it reads or
//! writes goes through [`DataAccess`], an abstract collaborator that owns
//! storage, transactions and write idempotency. Row shapes here mirror what
//! the collaborator returns; conversion into typed plan entities happens at
//! this boundary so malformed rows never reach the algorithms.
//!
//! [`MemoryStore`] is the reference implementation backing the CLI binary
//! and the test suite. Its write-failure switches let tests exercise the
//! recovered-write paths without a real storage outage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use crate::error::{DataError, Result};
use crate::models::{MetricSample, Plan};

/// One day of historical metrics, keyed by metric name
///
/// Metric keys are open-ended (providers disagree on HRV naming, for one),
/// so the row is a map rather than a fixed struct. Synonym resolution lives
/// in the recovery assessor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

impl MetricRow {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            values: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, key: &str, value: f64) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// Flatten the row into one sample per metric present
    pub fn samples(&self) -> impl Iterator<Item = MetricSample> + '_ {
        self.values.iter().map(move |(key, value)| MetricSample {
            date: self.date,
            metric_key: key.clone(),
            value: *value,
        })
    }
}

/// Summary of a stored plan, as returned by plan lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub id: i64,
    pub start_date: NaiveDate,
    pub weeks: u32,
}

/// Planned or actual weekly training volume for one muscle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuscleVolumeRow {
    pub muscle_id: i64,
    pub volume_kg: f64,
}

/// One stored workout row of a plan week, as consumed by the progression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRow {
    pub id: i64,
    pub exercise_id: i64,
    pub exercise_name: Option<String>,
    /// ISO weekday, 1=Mon .. 7=Sun
    pub day_of_week: u8,
    pub sets: u32,
    pub reps: u32,
    pub rir: Option<f64>,
    pub target_weight_kg: Option<f64>,
    pub is_conditioning: bool,
}

/// One logged set from the lift history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiftLogEntry {
    pub date: NaiveDate,
    pub weight_kg: Option<f64>,
    pub reps: u32,
    pub rir: Option<f64>,
}

/// A pending working-weight update for one workout row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetUpdate {
    pub workout_id: i64,
    pub target_weight_kg: f64,
}

/// Record of an applied back-off, kept by stores that support auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffApplication {
    pub week_start: NaiveDate,
    pub set_multiplier: f64,
    pub rir_increment: i32,
}

/// Abstract data-access collaborator
///
/// Reads that fail leave the caller unable to decide anything and therefore
/// return errors. The two write operations (`apply_plan_backoff`,
/// `update_workout_targets`/`refresh_plan_view`) may also fail, but their
/// callers catch those failures and downgrade them to decision state.
pub trait DataAccess {
    fn get_historical_data(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MetricRow>>;

    fn get_active_plan(&self) -> Result<Option<PlanSummary>>;

    fn find_plan_by_start_date(&self, start_date: NaiveDate) -> Result<Option<PlanSummary>>;

    fn get_plan_muscle_volume(
        &self,
        plan_id: i64,
        week_number: u32,
    ) -> Result<Vec<MuscleVolumeRow>>;

    fn get_actual_muscle_volume(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MuscleVolumeRow>>;

    fn apply_plan_backoff(
        &self,
        week_start: NaiveDate,
        set_multiplier: f64,
        rir_increment: i32,
    ) -> Result<()>;

    fn get_plan_week(&self, plan_id: i64, week_number: u32) -> Result<Vec<WorkoutRow>>;

    fn load_lift_log(&self, exercise_ids: &[i64]) -> Result<BTreeMap<i64, Vec<LiftLogEntry>>>;

    fn update_workout_targets(&self, updates: &[TargetUpdate]) -> Result<()>;

    fn refresh_plan_view(&self) -> Result<()>;

    fn save_training_plan(&self, plan: &Plan, start_date: NaiveDate) -> Result<i64>;
}

/// Stored plan-week rows, keyed by plan and week number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PlanWeekRows {
    plan_id: i64,
    week_number: u32,
    rows: Vec<WorkoutRow>,
}

/// Stored planned muscle volume, keyed by plan and week number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PlannedVolume {
    plan_id: i64,
    week_number: u32,
    rows: Vec<MuscleVolumeRow>,
}

/// Dated actual training volume for one muscle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ActualVolume {
    date: NaiveDate,
    muscle_id: i64,
    volume_kg: f64,
}

/// A persisted plan with its assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredPlan {
    id: i64,
    start_date: NaiveDate,
    plan: Plan,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
struct StoreState {
    metric_rows: Vec<MetricRow>,
    plans: Vec<StoredPlan>,
    active_plan_id: Option<i64>,
    plan_weeks: Vec<PlanWeekRows>,
    planned_volume: Vec<PlannedVolume>,
    actual_volume: Vec<ActualVolume>,
    lift_log: BTreeMap<i64, Vec<LiftLogEntry>>,
    backoff_applications: Vec<BackoffApplication>,
    target_update_batches: Vec<Vec<TargetUpdate>>,
    refresh_count: u32,
    next_plan_id: i64,
    next_workout_id: i64,
}

/// In-memory store used by the CLI binary and tests
///
/// The single-threaded interior mutability matches the concurrency model:
/// the core is synchronous and serializes writes through the collaborator.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<StoreState>,
    /// When set, the next apply_plan_backoff call fails
    pub fail_backoff: Cell<bool>,
    /// When set, the next update_workout_targets call fails
    pub fail_target_updates: Cell<bool>,
    /// When set, the next refresh_plan_view call fails
    pub fail_refresh: Cell<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.state.borrow_mut().next_plan_id = 1;
        store.state.borrow_mut().next_workout_id = 1;
        store
    }

    /// Rebuild a store from its JSON snapshot
    pub fn from_json(json: &str) -> Result<Self> {
        let state: StoreState = serde_json::from_str(json).map_err(|e| DataError::MalformedRow {
            entity: "store snapshot".to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            state: RefCell::new(state),
            ..Self::default()
        })
    }

    /// Serialize the store contents to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&*self.state.borrow())
            .map_err(|e| crate::error::LiftrsError::Internal(e.to_string()))
    }

    pub fn add_metric_row(&self, row: MetricRow) {
        self.state.borrow_mut().metric_rows.push(row);
    }

    pub fn set_active_plan(&self, plan_id: i64) {
        self.state.borrow_mut().active_plan_id = Some(plan_id);
    }

    pub fn add_planned_volume(&self, plan_id: i64, week_number: u32, rows: Vec<MuscleVolumeRow>) {
        self.state.borrow_mut().planned_volume.push(PlannedVolume {
            plan_id,
            week_number,
            rows,
        });
    }

    pub fn add_actual_volume(&self, date: NaiveDate, muscle_id: i64, volume_kg: f64) {
        self.state.borrow_mut().actual_volume.push(ActualVolume {
            date,
            muscle_id,
            volume_kg,
        });
    }

    pub fn add_plan_week(&self, plan_id: i64, week_number: u32, rows: Vec<WorkoutRow>) {
        self.state.borrow_mut().plan_weeks.push(PlanWeekRows {
            plan_id,
            week_number,
            rows,
        });
    }

    pub fn add_lift_log(&self, exercise_id: i64, entries: Vec<LiftLogEntry>) {
        self.state
            .borrow_mut()
            .lift_log
            .entry(exercise_id)
            .or_default()
            .extend(entries);
    }

    /// Back-off applications recorded so far
    pub fn backoff_applications(&self) -> Vec<BackoffApplication> {
        self.state.borrow().backoff_applications.clone()
    }

    /// Batches of target updates recorded so far
    pub fn target_update_batches(&self) -> Vec<Vec<TargetUpdate>> {
        self.state.borrow().target_update_batches.clone()
    }

    pub fn refresh_count(&self) -> u32 {
        self.state.borrow().refresh_count
    }

    pub fn saved_plan_count(&self) -> usize {
        self.state.borrow().plans.len()
    }

    pub fn saved_plan(&self, plan_id: i64) -> Option<Plan> {
        self.state
            .borrow()
            .plans
            .iter()
            .find(|p| p.id == plan_id)
            .map(|p| p.plan.clone())
    }
}

impl DataAccess for MemoryStore {
    fn get_historical_data(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<MetricRow>> {
        let mut rows: Vec<MetricRow> = self
            .state
            .borrow()
            .metric_rows
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }

    fn get_active_plan(&self) -> Result<Option<PlanSummary>> {
        let state = self.state.borrow();
        Ok(state.active_plan_id.and_then(|id| {
            state.plans.iter().find(|p| p.id == id).map(|p| PlanSummary {
                id: p.id,
                start_date: p.start_date,
                weeks: p.plan.weeks.len() as u32,
            })
        }))
    }

    fn find_plan_by_start_date(&self, start_date: NaiveDate) -> Result<Option<PlanSummary>> {
        let state = self.state.borrow();
        Ok(state
            .plans
            .iter()
            .find(|p| p.start_date == start_date)
            .map(|p| PlanSummary {
                id: p.id,
                start_date: p.start_date,
                weeks: p.plan.weeks.len() as u32,
            }))
    }

    fn get_plan_muscle_volume(
        &self,
        plan_id: i64,
        week_number: u32,
    ) -> Result<Vec<MuscleVolumeRow>> {
        Ok(self
            .state
            .borrow()
            .planned_volume
            .iter()
            .filter(|v| v.plan_id == plan_id && v.week_number == week_number)
            .flat_map(|v| v.rows.clone())
            .collect())
    }

    fn get_actual_muscle_volume(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MuscleVolumeRow>> {
        let state = self.state.borrow();
        let mut by_muscle: BTreeMap<i64, f64> = BTreeMap::new();
        for row in &state.actual_volume {
            if row.date >= start && row.date <= end {
                *by_muscle.entry(row.muscle_id).or_insert(0.0) += row.volume_kg;
            }
        }
        Ok(by_muscle
            .into_iter()
            .map(|(muscle_id, volume_kg)| MuscleVolumeRow {
                muscle_id,
                volume_kg,
            })
            .collect())
    }

    fn apply_plan_backoff(
        &self,
        week_start: NaiveDate,
        set_multiplier: f64,
        rir_increment: i32,
    ) -> Result<()> {
        if self.fail_backoff.get() {
            return Err(DataError::WriteFailed {
                operation: "apply_plan_backoff".to_string(),
                reason: "storage unavailable".to_string(),
            }
            .into());
        }
        self.state
            .borrow_mut()
            .backoff_applications
            .push(BackoffApplication {
                week_start,
                set_multiplier,
                rir_increment,
            });
        Ok(())
    }

    fn get_plan_week(&self, plan_id: i64, week_number: u32) -> Result<Vec<WorkoutRow>> {
        Ok(self
            .state
            .borrow()
            .plan_weeks
            .iter()
            .filter(|w| w.plan_id == plan_id && w.week_number == week_number)
            .flat_map(|w| w.rows.clone())
            .collect())
    }

    fn load_lift_log(&self, exercise_ids: &[i64]) -> Result<BTreeMap<i64, Vec<LiftLogEntry>>> {
        let state = self.state.borrow();
        let mut out = BTreeMap::new();
        for id in exercise_ids {
            if let Some(entries) = state.lift_log.get(id) {
                let mut entries = entries.clone();
                entries.sort_by_key(|e| e.date);
                out.insert(*id, entries);
            }
        }
        Ok(out)
    }

    fn update_workout_targets(&self, updates: &[TargetUpdate]) -> Result<()> {
        if self.fail_target_updates.get() {
            return Err(DataError::WriteFailed {
                operation: "update_workout_targets".to_string(),
                reason: "storage unavailable".to_string(),
            }
            .into());
        }
        let mut state = self.state.borrow_mut();
        for update in updates {
            for week in state.plan_weeks.iter_mut() {
                for row in week.rows.iter_mut() {
                    if row.id == update.workout_id {
                        row.target_weight_kg = Some(update.target_weight_kg);
                    }
                }
            }
        }
        state.target_update_batches.push(updates.to_vec());
        Ok(())
    }

    fn refresh_plan_view(&self) -> Result<()> {
        if self.fail_refresh.get() {
            return Err(DataError::WriteFailed {
                operation: "refresh_plan_view".to_string(),
                reason: "storage unavailable".to_string(),
            }
            .into());
        }
        self.state.borrow_mut().refresh_count += 1;
        Ok(())
    }

    fn save_training_plan(&self, plan: &Plan, start_date: NaiveDate) -> Result<i64> {
        let mut state = self.state.borrow_mut();
        let plan_id = state.next_plan_id.max(1);
        state.next_plan_id = plan_id + 1;

        // Materialize plan-week rows so progression can run against the
        // stored plan without a separate seeding step.
        for week in &plan.weeks {
            let mut rows = Vec::with_capacity(week.workouts.len());
            for workout in &week.workouts {
                let id = state.next_workout_id.max(1);
                state.next_workout_id = id + 1;
                rows.push(WorkoutRow {
                    id,
                    exercise_id: workout.exercise_id,
                    exercise_name: Some(workout.exercise_name.clone()),
                    day_of_week: crate::models::weekday_to_iso(workout.day_of_week),
                    sets: workout.sets,
                    reps: workout.reps,
                    rir: workout.rir.map(|r| r as f64),
                    target_weight_kg: None,
                    is_conditioning: workout.is_conditioning(),
                });
            }
            state.plan_weeks.push(PlanWeekRows {
                plan_id,
                week_number: week.week_number,
                rows,
            });
        }

        state.plans.push(StoredPlan {
            id: plan_id,
            start_date,
            plan: plan.clone(),
        });
        Ok(plan_id)
    }
}
