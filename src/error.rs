//! Error handling module for the partition planner
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Infeasibility inside the engine is an `Option::None`, not an error; it only
//! becomes `PlannerError::NoFeasibleLayout` at the top-level `plan_layout` call.

use thiserror::Error;

/// Main error type for the planner
#[derive(Error, Debug)]
pub enum PlannerError {
    /// Malformed disk description (geometry, overlapping partitions)
    #[error("Invalid disk: {0}")]
    InvalidDisk(String),

    /// Malformed desired partition (size policy, reuse pin)
    #[error("Invalid partition request: {0}")]
    InvalidPartition(String),

    /// No disk can host the requested partitions under any strategy
    #[error("No feasible partition layout: {0}")]
    NoFeasibleLayout(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for planner operations
pub type Result<T> = std::result::Result<T, PlannerError>;

// Convenient error constructors
impl PlannerError {
    /// Create an invalid disk error
    pub fn invalid_disk(msg: impl Into<String>) -> Self {
        Self::InvalidDisk(msg.into())
    }

    /// Create an invalid partition request error
    pub fn invalid_partition(msg: impl Into<String>) -> Self {
        Self::InvalidPartition(msg.into())
    }

    /// Create a no-feasible-layout error
    pub fn no_feasible_layout(msg: impl Into<String>) -> Self {
        Self::NoFeasibleLayout(msg.into())
    }

    /// Returns true if the error reports infeasibility rather than bad input
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::NoFeasibleLayout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlannerError::invalid_disk("cylinder size is zero");
        assert_eq!(err.to_string(), "Invalid disk: cylinder size is zero");

        let err = PlannerError::no_feasible_layout("2 disks tried");
        assert_eq!(err.to_string(), "No feasible partition layout: 2 disks tried");
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: PlannerError = json_err.into();
        assert!(matches!(err, PlannerError::Json(_)));
    }

    #[test]
    fn test_infeasible_classification() {
        assert!(PlannerError::no_feasible_layout("x").is_infeasible());
        assert!(!PlannerError::invalid_partition("x").is_infeasible());
    }
}
