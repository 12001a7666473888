//! crates/meal_plan_core/src/reconcile.rs
//!
//! Turns a raw plan proposal into a validated `MealsPlan`.
//!
//! Every proposed food name is resolved against the nutrition table. Foods the
//! table does not know are searched in the nutrition database and stored; foods
//! that still cannot be resolved are left out of the plan and reported as
//! omissions. Only a structurally broken proposal aborts reconciliation.

use crate::domain::{FoodItem, MacroTargets, Meal, MealItem, MealSlot, MealsPlan};
use crate::error::PlanError;
use crate::ports::{NutritionLookupService, NutritionTable, PortError};
use crate::proposal::{parse_proposal, RawPlanProposal};
use std::fmt;
use tracing::{debug, info, warn};

//=========================================================================================
// Reconciliation Outcome
//=========================================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OmissionReason {
    /// The nutrition database had nothing usable for this name.
    NotFound,
    /// The nutrition database call failed.
    LookupFailed(String),
    /// The proposed amount does not round to at least one gram.
    InvalidAmount,
    /// The nutrition table could not be read or written.
    StoreFailed(String),
}

impl fmt::Display for OmissionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OmissionReason::NotFound => f.write_str("not found in the nutrition database"),
            OmissionReason::LookupFailed(e) => write!(f, "nutrition lookup failed: {e}"),
            OmissionReason::InvalidAmount => f.write_str("invalid amount"),
            OmissionReason::StoreFailed(e) => write!(f, "nutrition table error: {e}"),
        }
    }
}

/// A proposed food that did not make it into the plan.
#[derive(Debug, Clone, PartialEq)]
pub struct Omission {
    pub meal: MealSlot,
    pub food: String,
    pub amount: f64,
    pub reason: OmissionReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub plan: MealsPlan,
    pub omissions: Vec<Omission>,
}

//=========================================================================================
// The Reconciler
//=========================================================================================

pub struct PlanReconciler<'a> {
    table: &'a dyn NutritionTable,
    lookup: &'a dyn NutritionLookupService,
}

impl<'a> PlanReconciler<'a> {
    pub fn new(table: &'a dyn NutritionTable, lookup: &'a dyn NutritionLookupService) -> Self {
        Self { table, lookup }
    }

    /// Parses the raw service answer and reconciles the proposal it contains.
    /// Fatal errors carry `raw` unchanged.
    pub async fn reconcile(
        &self,
        raw: &str,
        targets: MacroTargets,
    ) -> Result<Reconciliation, PlanError> {
        let proposal = parse_proposal(raw)?;
        self.reconcile_inner(proposal, targets, Some(raw)).await
    }

    /// Reconciles an already decoded proposal. The returned plan carries the
    /// proposal's `training_day` flag and the given `targets`.
    pub async fn reconcile_proposal(
        &self,
        proposal: RawPlanProposal,
        targets: MacroTargets,
    ) -> Result<Reconciliation, PlanError> {
        self.reconcile_inner(proposal, targets, None).await
    }

    async fn reconcile_inner(
        &self,
        proposal: RawPlanProposal,
        targets: MacroTargets,
        raw: Option<&str>,
    ) -> Result<Reconciliation, PlanError> {
        // Slot names are checked up front so a malformed proposal never touches the table.
        let slots = proposal
            .meals
            .iter()
            .map(|meal| meal.name.parse::<MealSlot>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| PlanError::MalformedProposal {
                reason: e.to_string(),
                raw: match raw {
                    Some(text) => text.to_string(),
                    None => serde_json::to_string(&proposal).unwrap_or_default(),
                },
            })?;

        let mut meals = Vec::with_capacity(proposal.meals.len());
        let mut omissions = Vec::new();

        for (slot, raw_meal) in slots.into_iter().zip(proposal.meals) {
            let mut items = Vec::with_capacity(raw_meal.items.len());

            for raw_item in raw_meal.items {
                let outcome = match whole_grams(raw_item.amount) {
                    Some(amount) => self
                        .resolve(&raw_item.food)
                        .await
                        .map(|food| MealItem { food, amount }),
                    None => Err(OmissionReason::InvalidAmount),
                };

                match outcome {
                    Ok(item) => items.push(item),
                    Err(reason) => {
                        warn!(
                            "Dropping '{}' ({} g) from {}: {}",
                            raw_item.food, raw_item.amount, slot, reason
                        );
                        omissions.push(Omission {
                            meal: slot,
                            food: raw_item.food,
                            amount: raw_item.amount,
                            reason,
                        });
                    }
                }
            }

            meals.push(Meal { name: slot, items });
        }

        let plan = MealsPlan {
            user: proposal.user,
            training_day: proposal.training_day,
            macros: targets,
            meals,
        };
        info!(
            "Reconciled plan for '{}': {} meals, {} items, {} omitted",
            plan.user,
            plan.meals.len(),
            plan.item_count(),
            omissions.len()
        );

        Ok(Reconciliation { plan, omissions })
    }

    /// Finds a food in the table, fetching and storing it first if needed.
    async fn resolve(&self, name: &str) -> Result<FoodItem, OmissionReason> {
        if let Some(item) = self.find(name).await? {
            return Ok(item);
        }

        info!("'{}' not found in the nutrition table, searching the nutrition database", name);
        let fetched = match self.lookup.search(name).await {
            Ok(Some(item)) if item.is_usable() => item,
            Ok(Some(item)) => {
                warn!("Lookup for '{}' returned an unusable item: {:?}", name, item);
                return Err(OmissionReason::NotFound);
            }
            Ok(None) => return Err(OmissionReason::NotFound),
            Err(e) => return Err(OmissionReason::LookupFailed(e.to_string())),
        };

        let fetched_name = fetched.name.clone();
        match self.table.insert(fetched).await {
            Ok(()) => info!("Added '{}' to the nutrition table", fetched_name),
            Err(PortError::AlreadyExists(_)) => {
                debug!("'{}' was already stored, using the stored row", fetched_name)
            }
            Err(e) => return Err(OmissionReason::StoreFailed(e.to_string())),
        }

        // Re-read so the plan always holds the canonical stored row.
        for key in [name, fetched_name.as_str()] {
            if let Some(item) = self.find(key).await? {
                return Ok(item);
            }
        }
        Err(OmissionReason::StoreFailed(format!(
            "'{fetched_name}' could not be read back after insertion"
        )))
    }

    async fn find(&self, name: &str) -> Result<Option<FoodItem>, OmissionReason> {
        self.table
            .find(name)
            .await
            .map_err(|e| OmissionReason::StoreFailed(e.to_string()))
    }
}

fn whole_grams(amount: f64) -> Option<u32> {
    let rounded = amount.round();
    if rounded.is_finite() && rounded >= 1.0 {
        Some(rounded.min(f64::from(u32::MAX)) as u32)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::tests::food;
    use crate::ports::{PortResult, NutritionTable};
    use crate::table::InMemoryNutritionTable;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned nutrition database keyed by the searched name.
    #[derive(Default)]
    pub(crate) struct FakeLookup {
        pub(crate) foods: HashMap<String, FoodItem>,
        pub(crate) failing: Vec<String>,
        pub(crate) searches: Mutex<Vec<String>>,
    }

    impl FakeLookup {
        pub(crate) fn with(foods: &[(&str, FoodItem)]) -> Self {
            Self {
                foods: foods
                    .iter()
                    .map(|(query, item)| (query.to_string(), item.clone()))
                    .collect(),
                ..Self::default()
            }
        }

        pub(crate) fn searches(&self) -> Vec<String> {
            self.searches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NutritionLookupService for FakeLookup {
        async fn search(&self, food_name: &str) -> PortResult<Option<FoodItem>> {
            self.searches.lock().unwrap().push(food_name.to_string());
            if self.failing.iter().any(|f| f == food_name) {
                return Err(PortError::Unexpected("connection reset".to_string()));
            }
            Ok(self.foods.get(food_name).cloned())
        }
    }

    /// A table where another writer stores the food right before our insert.
    struct RacingTable {
        inner: InMemoryNutritionTable,
        racer: Mutex<Option<FoodItem>>,
    }

    #[async_trait]
    impl NutritionTable for RacingTable {
        async fn find(&self, name: &str) -> PortResult<Option<FoodItem>> {
            self.inner.find(name).await
        }
        async fn insert(&self, item: FoodItem) -> PortResult<()> {
            let racer = self.racer.lock().unwrap().take();
            if let Some(racer) = racer {
                self.inner.insert(racer).await?;
            }
            self.inner.insert(item).await
        }
        async fn all(&self) -> PortResult<Vec<FoodItem>> {
            self.inner.all().await
        }
        async fn replace_all(&self, items: Vec<FoodItem>) -> PortResult<()> {
            self.inner.replace_all(items).await
        }
    }

    pub(crate) fn targets() -> MacroTargets {
        MacroTargets {
            protein: 160.0,
            fat: 72.0,
            carbohydrates: 367.8,
            calories: 2759.0,
            fiber: 23.0,
        }
    }

    #[tokio::test]
    async fn unresolvable_food_is_dropped_without_failing() {
        let table = InMemoryNutritionTable::with_items(vec![food("Oat", 40.0, 150.0)]);
        let lookup = FakeLookup::default();
        let reconciler = PlanReconciler::new(&table, &lookup);

        let raw = r#"{"user": "ana", "training_day": true, "meals": [
            {"name": "Meal 1", "items": [{"food": "oat", "amount": 60}, {"food": "Dragon fruit foam", "amount": 30}]}
        ]}"#;
        let result = reconciler.reconcile(raw, targets()).await.unwrap();

        let meal = &result.plan.meals[0];
        assert_eq!(meal.name, MealSlot::Meal1);
        assert_eq!(meal.items.len(), 1);
        assert_eq!(meal.items[0].food.name, "Oat");
        assert_eq!(meal.items[0].amount, 60);

        assert_eq!(
            result.omissions,
            vec![Omission {
                meal: MealSlot::Meal1,
                food: "Dragon fruit foam".to_string(),
                amount: 30.0,
                reason: OmissionReason::NotFound,
            }]
        );
        assert_eq!(lookup.searches(), ["Dragon fruit foam"]);
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn missing_food_is_fetched_stored_and_used() {
        let table = InMemoryNutritionTable::new();
        let lookup = FakeLookup::with(&[("Cooked lentils", food("Cooked Lentils", 198.0, 230.0))]);
        let reconciler = PlanReconciler::new(&table, &lookup);

        let raw = r#"{"user": "ana", "training_day": false, "meals": [
            {"name": "Meal 2", "items": [{"food": "Cooked lentils", "amount": 150}]},
            {"name": "Meal 3", "items": [{"food": "cooked LENTILS", "amount": 80}]}
        ]}"#;
        let result = reconciler.reconcile(raw, targets()).await.unwrap();

        assert!(result.omissions.is_empty());
        assert!(!result.plan.training_day);
        assert_eq!(result.plan.macros, targets());
        assert_eq!(result.plan.meals[0].items[0].food.name, "Cooked Lentils");
        assert_eq!(result.plan.meals[1].items[0].amount, 80);
        // The second mention is served from the table.
        assert_eq!(lookup.searches(), ["Cooked lentils"]);
        assert!(table.contains("cooked lentils").await.unwrap());
    }

    #[tokio::test]
    async fn lookup_result_under_another_name_is_still_resolved() {
        let table = InMemoryNutritionTable::new();
        let lookup = FakeLookup::with(&[("Rolled oats", food("Oatmeal", 40.0, 150.0))]);
        let reconciler = PlanReconciler::new(&table, &lookup);

        let raw = r#"{"user": "ana", "training_day": true, "meals": [
            {"name": "Meal 1", "items": [{"food": "Rolled oats", "amount": 50}]}
        ]}"#;
        let result = reconciler.reconcile(raw, targets()).await.unwrap();

        assert_eq!(result.plan.meals[0].items[0].food.name, "Oatmeal");
        assert!(table.contains("oatmeal").await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_insert_is_treated_as_already_stored() {
        let stored_by_other_writer = food("Banana", 118.0, 105.0);
        let table = RacingTable {
            inner: InMemoryNutritionTable::new(),
            racer: Mutex::new(Some(stored_by_other_writer.clone())),
        };
        let lookup = FakeLookup::with(&[("banana", food("BANANA", 100.0, 89.0))]);
        let reconciler = PlanReconciler::new(&table, &lookup);

        let raw = r#"{"user": "ana", "training_day": true, "meals": [
            {"name": "Snack", "items": [{"food": "banana", "amount": 120}]}
        ]}"#;
        let result = reconciler.reconcile(raw, targets()).await.unwrap();

        assert!(result.omissions.is_empty());
        assert_eq!(result.plan.meals[0].items[0].food, stored_by_other_writer);
        assert_eq!(table.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_lookup_and_bad_amounts_become_omissions() {
        let table = InMemoryNutritionTable::with_items(vec![food("Egg", 50.0, 72.0)]);
        let lookup = FakeLookup {
            failing: vec!["Quinoa".to_string()],
            ..FakeLookup::default()
        };
        let reconciler = PlanReconciler::new(&table, &lookup);

        let raw = r#"{"user": "ana", "training_day": true, "meals": [
            {"name": "Meal 1", "items": [
                {"food": "Quinoa", "amount": 80},
                {"food": "Egg", "amount": 0.2},
                {"food": "Egg", "amount": 99.6}
            ]}
        ]}"#;
        let result = reconciler.reconcile(raw, targets()).await.unwrap();

        assert_eq!(result.plan.meals[0].items.len(), 1);
        assert_eq!(result.plan.meals[0].items[0].amount, 100);
        let reasons: Vec<_> = result.omissions.iter().map(|o| o.reason.clone()).collect();
        assert_eq!(
            reasons,
            [
                OmissionReason::LookupFailed("An unexpected error occurred: connection reset".to_string()),
                OmissionReason::InvalidAmount,
            ]
        );
    }

    #[tokio::test]
    async fn empty_meals_are_kept() {
        let table = InMemoryNutritionTable::new();
        let lookup = FakeLookup::default();
        let reconciler = PlanReconciler::new(&table, &lookup);

        let raw = r#"{"user": "ana", "training_day": true, "meals": [
            {"name": "Pre-workout", "items": []},
            {"name": "Post workout", "items": [{"food": "Unobtainium", "amount": 10}]}
        ]}"#;
        let result = reconciler.reconcile(raw, targets()).await.unwrap();

        let slots: Vec<_> = result.plan.meals.iter().map(|m| m.name).collect();
        assert_eq!(slots, [MealSlot::PreWorkout, MealSlot::PostWorkout]);
        assert!(result.plan.meals.iter().all(|m| m.items.is_empty()));
        assert_eq!(result.omissions.len(), 1);
    }

    #[tokio::test]
    async fn structural_problems_are_fatal() {
        let table = InMemoryNutritionTable::new();
        let lookup = FakeLookup::default();
        let reconciler = PlanReconciler::new(&table, &lookup);

        let no_meals = r#"{"user": "ana", "training_day": true}"#;
        assert!(matches!(
            reconciler.reconcile(no_meals, targets()).await,
            Err(PlanError::MalformedProposal { .. })
        ));

        let unknown_slot = r#"{"user": "ana", "training_day": true, "meals": [
            {"name": "Brunch", "items": [{"food": "Egg", "amount": 100}]}
        ]}"#;
        let err = reconciler.reconcile(unknown_slot, targets()).await.unwrap_err();
        assert!(matches!(err, PlanError::MalformedProposal { ref reason, .. } if reason.contains("Brunch")));
        assert_eq!(err.raw_response(), Some(unknown_slot));
        assert!(lookup.searches().is_empty());

        assert!(matches!(
            reconciler.reconcile("no plan today", targets()).await,
            Err(PlanError::UnparsableResponse { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_slot_keeps_the_answer_as_sent() {
        let table = InMemoryNutritionTable::new();
        let lookup = FakeLookup::default();
        let reconciler = PlanReconciler::new(&table, &lookup);

        let answer = "Here you go:\n```json\n{\"user\": \"ana\", \"training_day\": true, \"meals\": [{\"name\": \"Brunch\", \"items\": []}]}\n```";
        let err = reconciler.reconcile(answer, targets()).await.unwrap_err();
        assert!(matches!(err, PlanError::MalformedProposal { .. }));
        assert_eq!(err.raw_response(), Some(answer));

        // Without the original text the decoded proposal is attached instead.
        let proposal = parse_proposal(answer).unwrap();
        let err = reconciler
            .reconcile_proposal(proposal, targets())
            .await
            .unwrap_err();
        assert!(err.raw_response().is_some_and(|raw| raw.contains("Brunch")));
    }
}
