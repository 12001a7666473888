//! crates/meal_plan_core/src/error.rs
//!
//! Errors that abort plan generation. Failures on individual foods never show up
//! here; the reconciler reports them as omissions instead.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// No JSON object could be found in the text-generation service's answer.
    #[error("No structured payload found in the plan proposal")]
    UnparsableResponse { raw: String },

    /// The payload is JSON but lacks (or mistypes) a required field.
    #[error("Malformed plan proposal: {reason}")]
    MalformedProposal { reason: String, raw: String },

    /// The text-generation service could not be reached or returned an error.
    #[error("Plan proposal service failed: {0}")]
    ProposalFailed(#[source] PortError),

    /// The nutrition table could not be read or written.
    #[error("Nutrition table error: {0}")]
    Store(#[source] PortError),
}

impl PlanError {
    /// The raw service answer that caused the failure, when there is one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            PlanError::UnparsableResponse { raw } | PlanError::MalformedProposal { raw, .. } => {
                Some(raw)
            }
            _ => None,
        }
    }
}
