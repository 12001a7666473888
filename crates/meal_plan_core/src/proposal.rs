//! crates/meal_plan_core/src/proposal.rs
//!
//! The request sent to the plan proposal service and the unvalidated plan it
//! answers with. The service tends to wrap its JSON in prose or code fences, so
//! the payload is extracted before it is decoded.

use crate::domain::{
    ActivityLevel, BiometricProfile, DietType, FoodItem, Goal, MacroTargets, MealSlot, Sex,
};
use crate::error::PlanError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

//=========================================================================================
// Plan Request
//=========================================================================================

/// Compact nutrition line for one food, given to the service as illustrative grounding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodContext {
    pub name: String,
    pub grams: f64,
    pub kcal: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl From<&FoodItem> for FoodContext {
    fn from(item: &FoodItem) -> Self {
        Self {
            name: item.name.clone(),
            grams: item.grams,
            kcal: item.kcal,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
        }
    }
}

impl fmt::Display for FoodContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}g): {} kcal, {}g protein, {}g carbs, {}g fat",
            self.name, self.grams, self.kcal, self.protein, self.carbs, self.fat
        )
    }
}

/// Everything the plan proposal service needs to suggest one day of meals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanRequest {
    pub user: String,
    pub training_day: bool,
    pub targets: MacroTargets,
    pub goal: Goal,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub diet_type: DietType,
    pub conditions: Vec<String>,
    pub notes: Option<String>,
    pub slots: Vec<MealSlot>,
    pub food_context: Vec<FoodContext>,
}

impl PlanRequest {
    /// Builds a request, keeping at most `context_size` foods as context.
    pub fn new<'a>(
        profile: &BiometricProfile,
        targets: MacroTargets,
        training_day: bool,
        foods: impl IntoIterator<Item = &'a FoodItem>,
        context_size: usize,
    ) -> Self {
        Self {
            user: profile.identifier(),
            training_day,
            targets,
            goal: profile.goal(),
            sex: profile.sex(),
            activity_level: profile.activity_level(),
            diet_type: profile.diet_type(),
            conditions: profile.conditions().to_vec(),
            notes: profile.notes().map(str::to_string),
            slots: MealSlot::ALL.to_vec(),
            food_context: foods.into_iter().take(context_size).map(FoodContext::from).collect(),
        }
    }

    /// The food context as one line per food.
    pub fn format_food_context(&self) -> String {
        self.food_context
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

//=========================================================================================
// Raw Plan Proposal
//=========================================================================================

/// A plan exactly as proposed by the service, before any food is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPlanProposal {
    pub user: String,
    pub training_day: bool,
    pub meals: Vec<RawMeal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeal {
    pub name: String,
    #[serde(default)]
    pub items: Vec<RawItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub food: String,
    /// Grams; the service sometimes answers with fractional values.
    pub amount: f64,
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").unwrap())
}

/// The first `{` that starts a complete JSON object, sliced to that object.
/// Braces in surrounding prose are skipped.
fn first_object(text: &str) -> Option<&str> {
    text.match_indices('{').find_map(|(start, _)| {
        let rest = &text[start..];
        let mut values = serde_json::Deserializer::from_str(rest).into_iter::<serde_json::Value>();
        match values.next() {
            Some(Ok(value)) if value.is_object() => Some(&rest[..values.byte_offset()]),
            _ => None,
        }
    })
}

/// Extracts the JSON object embedded in a service answer, ignoring code fences
/// and any surrounding prose.
pub fn extract_json_payload(text: &str) -> Result<&str, PlanError> {
    let fenced = code_fence()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .and_then(|body| first_object(body.as_str()));

    fenced
        .or_else(|| first_object(text))
        .ok_or_else(|| PlanError::UnparsableResponse {
            raw: text.to_string(),
        })
}

/// Extracts and decodes a `RawPlanProposal` from a service answer.
pub fn parse_proposal(text: &str) -> Result<RawPlanProposal, PlanError> {
    let payload = extract_json_payload(text)?;
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|_| PlanError::UnparsableResponse {
            raw: text.to_string(),
        })?;

    if !value.is_object() {
        return Err(PlanError::MalformedProposal {
            reason: "expected a JSON object at the top level".to_string(),
            raw: text.to_string(),
        });
    }

    serde_json::from_value(value).map_err(|e| PlanError::MalformedProposal {
        reason: e.to_string(),
        raw: text.to_string(),
    })
}
