//! services/planner/src/error.rs
//!
//! Defines the primary error type for the planner service.

use crate::config::ConfigError;
use meal_plan_core::{PlanError, PortError};

/// The primary error type for the `planner` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents a failure that aborted plan generation or the table refresh.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an invalid profile file.
    #[error("Invalid profile: {0}")]
    Profile(#[from] serde_json::Error),

    /// Represents a failure to encode the generated plan for output.
    #[error("Failed to encode the plan: {0}")]
    Output(#[source] serde_json::Error),

    /// Represents a standard Input/Output error (e.g., reading the profile file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Represents a wrong command line invocation.
    #[error("Usage: {0}")]
    Usage(String),
}
