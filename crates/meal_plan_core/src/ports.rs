//! crates/meal_plan_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the planner's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the nutrition table's storage, the nutrition database and
//! the text-generation service.

use crate::domain::FoodItem;
use crate::proposal::PlanRequest;
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., file system, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The nutrition table: food items keyed by their normalized name.
#[async_trait]
pub trait NutritionTable: Send + Sync {
    /// Case-insensitive exact match on the normalized name. Returns the first
    /// match when the underlying store holds duplicates.
    async fn find(&self, name: &str) -> PortResult<Option<FoodItem>>;

    async fn contains(&self, name: &str) -> PortResult<bool> {
        Ok(self.find(name).await?.is_some())
    }

    /// Appends a new item. Fails with `PortError::AlreadyExists` if an item with
    /// the same normalized name is already stored.
    async fn insert(&self, item: FoodItem) -> PortResult<()>;

    /// Every stored item, in storage order.
    async fn all(&self) -> PortResult<Vec<FoodItem>>;

    /// Replaces the whole table with `items`.
    async fn replace_all(&self, items: Vec<FoodItem>) -> PortResult<()>;
}

#[async_trait]
pub trait NutritionLookupService: Send + Sync {
    /// Searches an external nutrition database for the best generic match.
    /// `Ok(None)` means nothing usable was found.
    async fn search(&self, food_name: &str) -> PortResult<Option<FoodItem>>;
}

#[async_trait]
pub trait PlanProposalService: Send + Sync {
    /// Asks the text-generation service for a plan and returns its raw answer.
    async fn propose(&self, request: &PlanRequest) -> PortResult<String>;
}
