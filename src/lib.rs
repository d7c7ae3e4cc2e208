// Library interface for the liftrs decision engine
// The CLI binary and integration tests both build on these modules

pub mod adherence;
pub mod baseline;
pub mod config;
pub mod data_access;
pub mod decision;
pub mod error;
pub mod logging;
pub mod models;
pub mod periodization;
pub mod progression;
pub mod recovery;
pub mod validator;

// Re-export commonly used types for convenience
pub use models::*;
pub use adherence::{AdherenceAssessment, AdherenceSnapshot, Direction};
pub use baseline::{compute_baseline, BaselineResult, WindowStats};
pub use config::Settings;
pub use data_access::{DataAccess, MemoryStore};
pub use decision::{
    assess_recovery_and_backoff, validate_and_adjust_plan, ValidationDecision, WriteOutcome,
};
pub use error::{LiftrsError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use periodization::build_block;
pub use progression::{calibrate_plan_week, PlanProgressionDecision, WorkoutProgression};
pub use recovery::{BackoffRecommendation, ReadinessSummary, Severity};
pub use validator::validate_plan_structure;
