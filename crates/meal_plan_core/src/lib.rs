pub mod domain;
pub mod error;
pub mod macros;
pub mod pipeline;
pub mod ports;
pub mod proposal;
pub mod reconcile;
pub mod table;

pub use domain::{
    normalize_food_name, ActivityLevel, BiometricProfile, DietType, ExtendedNutrients, FoodItem,
    Goal, Implementation, MacroTargets, Meal, MealItem, MealSlot, MealsPlan, NewProfile,
    Nutrition, ProfileError, Sex,
};
pub use error::PlanError;
pub use macros::{CalculationMethod, MacroCalculator, MacroError};
pub use pipeline::{PlanGenerationPipeline, RefreshReport, DEFAULT_CONTEXT_SIZE, DEFAULT_SEED_FOODS};
pub use ports::{
    NutritionLookupService, NutritionTable, PlanProposalService, PortError, PortResult,
};
pub use proposal::{extract_json_payload, parse_proposal, PlanRequest, RawPlanProposal};
pub use reconcile::{Omission, OmissionReason, PlanReconciler, Reconciliation};
pub use table::InMemoryNutritionTable;
