//! Unified error hierarchy for liftrs
//!
//! Read failures and structural invariant violations are fatal and bubble up
//! through these types. Write failures against the data-access collaborator
//! are handled at their call sites and surface as decision state instead
//! (see `decision` and `progression`).

use thiserror::Error;

/// Top-level error type for all liftrs operations
#[derive(Debug, Error)]
pub enum LiftrsError {
    /// Calculation could not be performed on the available data
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Data-access collaborator errors (reads)
    #[error("Data access error: {0}")]
    Data(#[from] DataError),

    /// A generated or loaded plan violated structural invariants
    #[error("Plan structure error: {0}")]
    PlanStructure(#[from] PlanStructureError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while computing decisions from fetched data
#[derive(Debug, Error)]
pub enum CalculationError {
    /// Insufficient data for a calculation that cannot proceed without it
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Invalid parameter
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },
}

/// Errors surfaced by the data-access collaborator
#[derive(Debug, Error)]
pub enum DataError {
    /// A read operation failed
    #[error("Read failed in {operation}: {reason}")]
    ReadFailed { operation: String, reason: String },

    /// A write operation failed
    #[error("Write failed in {operation}: {reason}")]
    WriteFailed { operation: String, reason: String },

    /// A requested record does not exist
    #[error("Record not found: {entity} {key}")]
    NotFound { entity: String, key: String },

    /// A stored row could not be mapped into a typed entity
    #[error("Malformed row in {entity}: {reason}")]
    MalformedRow { entity: String, reason: String },

    /// Persisting a plan returned no usable id
    #[error("Save returned no plan id for start date {start_date}")]
    MissingPlanId { start_date: chrono::NaiveDate },
}

/// Aggregated structural validation failure
///
/// All checks run before this is raised, so `errors` carries every failure
/// found in one pass rather than the first one hit.
#[derive(Debug, Error)]
#[error("plan failed validation: {}", errors.join("; "))]
pub struct PlanStructureError {
    pub errors: Vec<String>,
}

impl PlanStructureError {
    pub fn new(errors: Vec<String>) -> Self {
        Self { errors }
    }
}

/// Result type alias for liftrs operations
pub type Result<T> = std::result::Result<T, LiftrsError>;

impl LiftrsError {
    /// Check if error is retryable once the underlying store recovers
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LiftrsError::Data(DataError::ReadFailed { .. })
                | LiftrsError::Data(DataError::WriteFailed { .. })
                | LiftrsError::Io(_)
        )
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            LiftrsError::Calculation(CalculationError::InsufficientData {
                calculation, ..
            }) => {
                format!(
                    "Not enough data to compute {}. No decision or plan was produced.",
                    calculation
                )
            }
            LiftrsError::PlanStructure(err) => {
                format!(
                    "The generated plan is invalid and was not saved: {}",
                    err.errors.join("; ")
                )
            }
            LiftrsError::Data(DataError::ReadFailed { operation, .. }) => {
                format!(
                    "Could not read data needed for {}. Retry once storage is available.",
                    operation
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        let err = LiftrsError::Data(DataError::ReadFailed {
            operation: "get_historical_data".to_string(),
            reason: "timeout".to_string(),
        });
        assert!(err.is_retryable());

        let err = LiftrsError::PlanStructure(PlanStructureError::new(vec![
            "expected 4 weeks, found 3".to_string(),
        ]));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_structure_error_joins_failures() {
        let err = PlanStructureError::new(vec![
            "expected 4 weeks, found 3".to_string(),
            "week 2: missing main slot on Tue".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("expected 4 weeks"));
        assert!(msg.contains("missing main slot"));
    }

    #[test]
    fn test_user_messages() {
        let err = LiftrsError::Calculation(CalculationError::InsufficientData {
            calculation: "block seeding".to_string(),
            reason: "no recent metrics".to_string(),
        });
        assert!(err.user_message().contains("Not enough data"));
    }
}
