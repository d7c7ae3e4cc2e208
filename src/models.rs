//! Core data model for liftrs
//!
//! Typed plan entities produced by the periodization builder, consumed by the
//! structural validator, and persisted (as rows) by the external data-access
//! collaborator. The core never owns persisted state; these types are the
//! in-memory shape decisions are made against.

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DataError, Result};

/// A single observation of one physiological metric
///
/// Produced by ingestion (external) and read-only to the core. Resting heart
/// rate, sleep minutes and HRV all share this shape, distinguished by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub date: NaiveDate,
    pub metric_key: String,
    pub value: f64,
}

/// Week intensity within a periodized block
///
/// A block always cycles light -> medium -> heavy -> deload and then ends;
/// the next block starts the sequence fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intensity {
    Light,
    Medium,
    Heavy,
    Deload,
}

impl Intensity {
    /// The fixed 4-week block sequence
    pub const BLOCK_SEQUENCE: [Intensity; 4] = [
        Intensity::Light,
        Intensity::Medium,
        Intensity::Heavy,
        Intensity::Deload,
    ];
}

impl fmt::Display for Intensity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intensity::Light => write!(f, "light"),
            Intensity::Medium => write!(f, "medium"),
            Intensity::Heavy => write!(f, "heavy"),
            Intensity::Deload => write!(f, "deload"),
        }
    }
}

/// Workout-role classification within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Anchors the session; exactly one per training day
    Main,
    Secondary,
    Auxiliary,
    Conditioning,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Main => write!(f, "main"),
            Slot::Secondary => write!(f, "secondary"),
            Slot::Auxiliary => write!(f, "auxiliary"),
            Slot::Conditioning => write!(f, "conditioning"),
        }
    }
}

/// Muscle-group bucket used for volume balancing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MuscleGroup {
    UpperPush,
    UpperPull,
    Lower,
    Core,
    Conditioning,
}

impl MuscleGroup {
    /// Groups that must all carry positive volume in a balanced plan
    pub const REQUIRED: [MuscleGroup; 3] = [
        MuscleGroup::UpperPush,
        MuscleGroup::UpperPull,
        MuscleGroup::Lower,
    ];
}

impl fmt::Display for MuscleGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuscleGroup::UpperPush => write!(f, "upper_push"),
            MuscleGroup::UpperPull => write!(f, "upper_pull"),
            MuscleGroup::Lower => write!(f, "lower"),
            MuscleGroup::Core => write!(f, "core"),
            MuscleGroup::Conditioning => write!(f, "conditioning"),
        }
    }
}

/// A single prescribed workout entry within a week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub day_of_week: Weekday,
    pub exercise_id: i64,
    pub exercise_name: String,
    pub sets: u32,
    pub reps: u32,
    /// Target reps-in-reserve; conditioning slots carry none
    pub rir: Option<u32>,
    /// Session focus this entry belongs to ("push", "lower", ...)
    pub focus: String,
    pub slot: Slot,
    pub muscle_group: MuscleGroup,
    pub intensity: Intensity,
}

impl Workout {
    pub fn is_conditioning(&self) -> bool {
        self.slot == Slot::Conditioning
    }
}

/// One week of a periodized block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Week {
    /// 1-based position within the block
    pub week_number: u32,
    pub intensity: Intensity,
    pub start_date: NaiveDate,
    pub workouts: Vec<Workout>,
}

/// A fully-built training plan (one 4-week block)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub start_date: NaiveDate,
    pub weeks: Vec<Week>,
}

impl Plan {
    /// Total prescribed sets per muscle group across the whole plan
    pub fn sets_by_muscle_group(&self) -> std::collections::BTreeMap<MuscleGroup, u32> {
        let mut totals = std::collections::BTreeMap::new();
        for week in &self.weeks {
            for workout in &week.workouts {
                *totals.entry(workout.muscle_group).or_insert(0) += workout.sets;
            }
        }
        totals
    }
}

/// Convert an ISO weekday number (1=Mon .. 7=Sun) from a storage row
///
/// Storage rows carry raw integers; the typed model only ever holds a valid
/// `Weekday`, so the conversion is the one place malformed values can appear.
pub fn weekday_from_iso(dow: u8) -> Result<Weekday> {
    match dow {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(DataError::MalformedRow {
            entity: "workout".to_string(),
            reason: format!("day_of_week {} outside 1..=7", other),
        }
        .into()),
    }
}

/// ISO weekday number (1=Mon .. 7=Sun) for a typed weekday
pub fn weekday_to_iso(day: Weekday) -> u8 {
    day.number_from_monday() as u8
}
