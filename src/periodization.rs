//! Periodized 4-week block construction
//!
//! A block always runs light, medium, heavy, deload and then ends; the next
//! block restarts the cycle. Exercises rotate through fixed pools with
//! cursors seeded from the start date, so consecutive blocks vary their
//! selections deterministically. Recent sleep and resting-HR averages can
//! tilt a whole block lighter before it is built.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::config::Settings;
use crate::data_access::{DataAccess, MetricRow};
use crate::error::{CalculationError, DataError, PlanStructureError, Result};
use crate::models::{Intensity, MuscleGroup, Plan, Slot, Week, Workout};
use crate::recovery::{RHR_KEY, SLEEP_KEY};
use crate::validator::check_muscle_balance;

/// Rotating exercise pools, one per movement family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PoolId {
    PushCompound,
    PushAccessory,
    PullCompound,
    PullAccessory,
    LowerCompound,
    LowerAccessory,
    Core,
    Conditioning,
}

impl PoolId {
    pub const ALL: [PoolId; 8] = [
        PoolId::PushCompound,
        PoolId::PushAccessory,
        PoolId::PullCompound,
        PoolId::PullAccessory,
        PoolId::LowerCompound,
        PoolId::LowerAccessory,
        PoolId::Core,
        PoolId::Conditioning,
    ];

    pub fn muscle_group(&self) -> MuscleGroup {
        match self {
            PoolId::PushCompound | PoolId::PushAccessory => MuscleGroup::UpperPush,
            PoolId::PullCompound | PoolId::PullAccessory => MuscleGroup::UpperPull,
            PoolId::LowerCompound | PoolId::LowerAccessory => MuscleGroup::Lower,
            PoolId::Core => MuscleGroup::Core,
            PoolId::Conditioning => MuscleGroup::Conditioning,
        }
    }

    /// Catalogue entries, ordered; ids are stable across releases
    pub fn exercises(&self) -> &'static [(i64, &'static str)] {
        match self {
            PoolId::PushCompound => &[
                (101, "Barbell Bench Press"),
                (102, "Overhead Press"),
                (103, "Incline Bench Press"),
                (104, "Weighted Dip"),
            ],
            PoolId::PushAccessory => &[
                (111, "Dumbbell Shoulder Press"),
                (112, "Cable Fly"),
                (113, "Lateral Raise"),
                (114, "Triceps Pushdown"),
            ],
            PoolId::PullCompound => &[
                (201, "Barbell Row"),
                (202, "Weighted Pull-Up"),
                (203, "Pendlay Row"),
                (204, "Chest-Supported Row"),
            ],
            PoolId::PullAccessory => &[
                (211, "Lat Pulldown"),
                (212, "Face Pull"),
                (213, "Dumbbell Curl"),
                (214, "Single-Arm Cable Row"),
            ],
            PoolId::LowerCompound => &[
                (301, "Back Squat"),
                (302, "Deadlift"),
                (303, "Front Squat"),
                (304, "Romanian Deadlift"),
            ],
            PoolId::LowerAccessory => &[
                (311, "Leg Press"),
                (312, "Walking Lunge"),
                (313, "Leg Curl"),
                (314, "Hip Thrust"),
            ],
            PoolId::Core => &[
                (401, "Hanging Leg Raise"),
                (402, "Ab Wheel Rollout"),
                (403, "Cable Crunch"),
                (404, "Weighted Plank"),
            ],
            PoolId::Conditioning => &[
                (501, "Rowing Intervals"),
                (502, "Assault Bike Sprints"),
                (503, "Sled Push"),
                (504, "Jump Rope"),
            ],
        }
    }
}

/// Per-pool rotation cursors for one block build
///
/// A fresh state is constructed per build, seeded from the start date's
/// ordinal, so rotation is deterministic without any global state.
#[derive(Debug, Clone)]
pub struct RotationState {
    cursors: BTreeMap<PoolId, usize>,
}

impl RotationState {
    pub fn seeded(start_date: NaiveDate) -> Self {
        let seed = start_date.num_days_from_ce() as usize;
        let cursors = PoolId::ALL
            .iter()
            .enumerate()
            .map(|(index, pool)| (*pool, (seed + index) % pool.exercises().len()))
            .collect();
        Self { cursors }
    }

    /// Take the next exercise from a pool, advancing its cursor with wrap
    pub fn pull(&mut self, pool: PoolId) -> (i64, &'static str) {
        let exercises = pool.exercises();
        let cursor = self.cursors.entry(pool).or_insert(0);
        let picked = exercises[*cursor % exercises.len()];
        *cursor = (*cursor + 1) % exercises.len();
        picked
    }
}

/// How reps are picked from a slot's rep range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RepBias {
    Low,
    Mid,
    High,
}

/// Week-level scaling derived from intensity and the light preference
#[derive(Debug, Clone, Copy, PartialEq)]
struct IntensityParams {
    set_multiplier: f64,
    rir_adjust: i32,
    rep_bias: RepBias,
}

/// Fixed per-intensity scaling, with a dedicated column for the light tilt
///
/// The tilted multipliers are chosen so that main-lift sets still step up
/// strictly light -> medium -> heavy before the deload drop: a uniform
/// discount would collapse medium and heavy onto the same rounded set
/// count. Heavy keeps most of its volume under the tilt; its relief comes
/// through the extra RIR and the rep bias never favoring low reps.
fn intensity_params(intensity: Intensity, prefer_light: bool) -> IntensityParams {
    match (intensity, prefer_light) {
        (Intensity::Light, false) => IntensityParams {
            set_multiplier: 0.85,
            rir_adjust: 1,
            rep_bias: RepBias::High,
        },
        (Intensity::Light, true) => IntensityParams {
            set_multiplier: 0.765,
            rir_adjust: 2,
            rep_bias: RepBias::High,
        },
        (Intensity::Medium, false) => IntensityParams {
            set_multiplier: 1.00,
            rir_adjust: 0,
            rep_bias: RepBias::Mid,
        },
        (Intensity::Medium, true) => IntensityParams {
            set_multiplier: 0.90,
            rir_adjust: 1,
            rep_bias: RepBias::Mid,
        },
        (Intensity::Heavy, false) => IntensityParams {
            set_multiplier: 1.15,
            rir_adjust: -1,
            rep_bias: RepBias::Low,
        },
        (Intensity::Heavy, true) => IntensityParams {
            set_multiplier: 1.125,
            rir_adjust: 0,
            rep_bias: RepBias::Mid,
        },
        (Intensity::Deload, false) => IntensityParams {
            set_multiplier: 0.70,
            rir_adjust: 2,
            rep_bias: RepBias::High,
        },
        (Intensity::Deload, true) => IntensityParams {
            set_multiplier: 0.63,
            rir_adjust: 3,
            rep_bias: RepBias::High,
        },
    }
}

/// One slot of a session blueprint
struct SlotSpec {
    slot: Slot,
    pool: PoolId,
    base_sets: u32,
    min_sets: u32,
    rep_range: (u32, u32),
    base_rir: Option<i32>,
}

/// One fixed weekday session
struct SessionSpec {
    day: Weekday,
    focus: &'static str,
    slots: &'static [SlotSpec],
}

/// The weekly session blueprint
///
/// Friday anchors its own main lift and carries the conditioning slot, so
/// every strength day has exactly one main slot while the week still closes
/// with a conditioning session.
const SESSION_BLUEPRINT: [SessionSpec; 4] = [
    SessionSpec {
        day: Weekday::Mon,
        focus: "push",
        slots: &[
            SlotSpec {
                slot: Slot::Main,
                pool: PoolId::PushCompound,
                base_sets: 4,
                min_sets: 2,
                rep_range: (5, 8),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Secondary,
                pool: PoolId::PushAccessory,
                base_sets: 3,
                min_sets: 2,
                rep_range: (8, 12),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Auxiliary,
                pool: PoolId::PullAccessory,
                base_sets: 3,
                min_sets: 1,
                rep_range: (10, 15),
                base_rir: Some(2),
            },
        ],
    },
    SessionSpec {
        day: Weekday::Tue,
        focus: "lower",
        slots: &[
            SlotSpec {
                slot: Slot::Main,
                pool: PoolId::LowerCompound,
                base_sets: 4,
                min_sets: 2,
                rep_range: (5, 8),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Secondary,
                pool: PoolId::LowerAccessory,
                base_sets: 3,
                min_sets: 2,
                rep_range: (8, 12),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Auxiliary,
                pool: PoolId::Core,
                base_sets: 3,
                min_sets: 1,
                rep_range: (10, 15),
                base_rir: Some(2),
            },
        ],
    },
    SessionSpec {
        day: Weekday::Thu,
        focus: "pull",
        slots: &[
            SlotSpec {
                slot: Slot::Main,
                pool: PoolId::PullCompound,
                base_sets: 4,
                min_sets: 2,
                rep_range: (5, 8),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Secondary,
                pool: PoolId::PullAccessory,
                base_sets: 3,
                min_sets: 2,
                rep_range: (8, 12),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Auxiliary,
                pool: PoolId::PushAccessory,
                base_sets: 3,
                min_sets: 1,
                rep_range: (10, 15),
                base_rir: Some(2),
            },
        ],
    },
    SessionSpec {
        day: Weekday::Fri,
        focus: "lower",
        slots: &[
            SlotSpec {
                slot: Slot::Main,
                pool: PoolId::LowerCompound,
                base_sets: 4,
                min_sets: 2,
                rep_range: (5, 8),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Auxiliary,
                pool: PoolId::Core,
                base_sets: 3,
                min_sets: 1,
                rep_range: (10, 15),
                base_rir: Some(2),
            },
            SlotSpec {
                slot: Slot::Conditioning,
                pool: PoolId::Conditioning,
                base_sets: 1,
                min_sets: 1,
                rep_range: (1, 1),
                base_rir: None,
            },
        ],
    },
];

fn slot_sets(spec: &SlotSpec, params: IntensityParams) -> u32 {
    let effective = match spec.slot {
        Slot::Conditioning => 1.0,
        Slot::Auxiliary => params.set_multiplier * 0.9,
        _ => params.set_multiplier,
    };
    let scaled = (spec.base_sets as f64 * effective).round() as u32;
    scaled.max(spec.min_sets)
}

fn slot_reps(spec: &SlotSpec, params: IntensityParams) -> u32 {
    let (low, high) = spec.rep_range;
    match params.rep_bias {
        RepBias::Low => low,
        RepBias::High => high,
        RepBias::Mid => (low + high) / 2,
    }
}

fn slot_rir(spec: &SlotSpec, params: IntensityParams) -> Option<u32> {
    spec.base_rir
        .map(|base| (base + params.rir_adjust).clamp(0, 4) as u32)
}

/// Build the 4-week plan for a start date, without touching storage
pub fn build_plan(start_date: NaiveDate, prefer_light: bool) -> Plan {
    let mut rotation = RotationState::seeded(start_date);
    let mut weeks = Vec::with_capacity(Intensity::BLOCK_SEQUENCE.len());

    for (index, &intensity) in Intensity::BLOCK_SEQUENCE.iter().enumerate() {
        let params = intensity_params(intensity, prefer_light);
        let week_start = start_date + Duration::days(7 * index as i64);
        let mut workouts = Vec::new();

        for session in &SESSION_BLUEPRINT {
            for spec in session.slots {
                let (exercise_id, exercise_name) = rotation.pull(spec.pool);
                workouts.push(Workout {
                    day_of_week: session.day,
                    exercise_id,
                    exercise_name: exercise_name.to_string(),
                    sets: slot_sets(spec, params),
                    reps: slot_reps(spec, params),
                    rir: slot_rir(spec, params),
                    focus: session.focus.to_string(),
                    slot: spec.slot,
                    muscle_group: spec.pool.muscle_group(),
                    intensity,
                });
            }
        }

        weeks.push(Week {
            week_number: index as u32 + 1,
            intensity,
            start_date: week_start,
            workouts,
        });
    }

    Plan {
        start_date,
        weeks,
    }
}

/// Mean of one metric over recent rows, skipping missing and zero values
fn recent_mean(rows: &[MetricRow], key: &str) -> Option<f64> {
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get(key))
        .filter(|v| *v != 0.0)
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Decide whether the upcoming block should be tilted lighter
pub fn prefer_light_signal(rows: &[MetricRow], settings: &Settings) -> bool {
    let sleep_low = recent_mean(rows, SLEEP_KEY)
        .map(|mean| mean < settings.block.sleep_floor_minutes)
        .unwrap_or(false);
    let rhr_high = recent_mean(rows, RHR_KEY)
        .map(|mean| mean > settings.block.rhr_ceiling)
        .unwrap_or(false);
    sleep_low || rhr_high
}

/// Build, balance-check and persist a new block starting at `start_date`
///
/// Idempotent: an existing plan with the same start date short-circuits to
/// its id without rebuilding or writing. Having no recent metrics at all is
/// fatal; the block cannot be seeded blind.
pub fn build_block(
    store: &dyn DataAccess,
    start_date: NaiveDate,
    settings: &Settings,
) -> Result<i64> {
    if let Some(existing) = store.find_plan_by_start_date(start_date)? {
        info!(
            plan_id = existing.id,
            start_date = %start_date,
            "plan already exists for start date, skipping build"
        );
        return Ok(existing.id);
    }

    let window_end = start_date - Duration::days(1);
    let window_start = start_date - Duration::days(7);
    let rows = store.get_historical_data(window_start, window_end)?;
    if rows.is_empty() {
        return Err(CalculationError::InsufficientData {
            calculation: "block seeding".to_string(),
            reason: format!(
                "no metrics between {} and {}",
                window_start, window_end
            ),
        }
        .into());
    }

    let prefer_light = prefer_light_signal(&rows, settings);
    if prefer_light {
        warn!(start_date = %start_date, "recent metrics prefer a lighter block");
    }

    let plan = build_plan(start_date, prefer_light);

    let balance_errors = check_muscle_balance(&plan, settings.block.balance_tolerance);
    if !balance_errors.is_empty() {
        return Err(PlanStructureError::new(balance_errors).into());
    }

    let plan_id = store.save_training_plan(&plan, start_date)?;
    if plan_id <= 0 {
        return Err(DataError::MissingPlanId { start_date }.into());
    }

    info!(plan_id, start_date = %start_date, prefer_light, "block built and saved");
    Ok(plan_id)
}
