//! crates/meal_plan_core/src/pipeline.rs
//!
//! Orchestrates one plan generation: compute the macro targets, ask the proposal
//! service for a plan, then reconcile it against the nutrition table. Also hosts
//! the maintenance path that rebuilds the table from a seed list of foods.

use crate::domain::{normalize_food_name, BiometricProfile, FoodItem, MacroTargets, MealsPlan};
use crate::error::PlanError;
use crate::macros::{CalculationMethod, MacroCalculator};
use crate::ports::{NutritionLookupService, NutritionTable, PlanProposalService};
use crate::proposal::PlanRequest;
use crate::reconcile::{PlanReconciler, Reconciliation};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Number of table rows sent to the proposal service as context.
pub const DEFAULT_CONTEXT_SIZE: usize = 15;

/// Foods used to bootstrap an empty nutrition table.
pub const DEFAULT_SEED_FOODS: [&str; 8] = [
    "cooked chicken breast",
    "egg",
    "oat",
    "banana",
    "cooked salmon",
    "cooked lentils",
    "milk",
    "cooked broccoli",
];

/// Outcome of `refresh_nutrition_table`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    /// Names of the items now stored in the table.
    pub stored: Vec<String>,
    /// Search terms that produced nothing usable.
    pub missing: Vec<String>,
}

pub struct PlanGenerationPipeline {
    table: Arc<dyn NutritionTable>,
    lookup: Arc<dyn NutritionLookupService>,
    proposer: Arc<dyn PlanProposalService>,
    method: CalculationMethod,
    context_size: usize,
}

impl PlanGenerationPipeline {
    pub fn new(
        table: Arc<dyn NutritionTable>,
        lookup: Arc<dyn NutritionLookupService>,
        proposer: Arc<dyn PlanProposalService>,
    ) -> Self {
        Self {
            table,
            lookup,
            proposer,
            method: CalculationMethod::default(),
            context_size: DEFAULT_CONTEXT_SIZE,
        }
    }

    pub fn with_method(mut self, method: CalculationMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_context_size(mut self, context_size: usize) -> Self {
        self.context_size = context_size;
        self
    }

    pub fn targets(&self, profile: &BiometricProfile) -> MacroTargets {
        MacroCalculator::compute(profile, self.method)
    }

    pub async fn generate(
        &self,
        profile: &BiometricProfile,
        training_day: bool,
    ) -> Result<MealsPlan, PlanError> {
        Ok(self.generate_detailed(profile, training_day).await?.plan)
    }

    /// Like `generate`, but also returns the foods that were left out of the plan.
    pub async fn generate_detailed(
        &self,
        profile: &BiometricProfile,
        training_day: bool,
    ) -> Result<Reconciliation, PlanError> {
        let targets = self.targets(profile);
        info!(
            "Targets for '{}' ({} method): {} kcal, {} g protein, {} g fat, {} g carbs, {} g fiber",
            profile.identifier(),
            self.method,
            targets.calories,
            targets.protein,
            targets.fat,
            targets.carbohydrates,
            targets.fiber
        );

        let foods = self.table.all().await.map_err(PlanError::Store)?;
        let request = PlanRequest::new(profile, targets, training_day, &foods, self.context_size);

        let raw = self
            .proposer
            .propose(&request)
            .await
            .map_err(PlanError::ProposalFailed)?;
        debug!("Plan proposal service answered:\n{}", raw);

        let reconciler = PlanReconciler::new(self.table.as_ref(), self.lookup.as_ref());
        reconciler.reconcile(&raw, targets).await.inspect_err(|e| {
            error!("Could not build a plan from the proposal: {}", e);
        })
    }

    /// Rebuilds the nutrition table from the best match of each search term.
    /// Terms resolving to an already collected food are stored once.
    pub async fn refresh_nutrition_table<S: AsRef<str>>(
        &self,
        search_terms: &[S],
    ) -> Result<RefreshReport, PlanError> {
        let mut report = RefreshReport::default();
        let mut seen = HashSet::new();
        let mut items: Vec<FoodItem> = Vec::new();

        for term in search_terms.iter().map(AsRef::as_ref) {
            info!("Searching for: {}", term);
            match self.lookup.search(term).await {
                Ok(Some(item)) if item.is_usable() => {
                    if seen.insert(normalize_food_name(&item.name)) {
                        report.stored.push(item.name.clone());
                        items.push(item);
                    } else {
                        info!("'{}' is already collected, skipping duplicate", item.name);
                    }
                }
                Ok(_) => {
                    warn!("The food information for '{}' wasn't found", term);
                    report.missing.push(term.to_string());
                }
                Err(e) => {
                    warn!("Failed to retrieve '{}': {}", term, e);
                    report.missing.push(term.to_string());
                }
            }
        }

        self.table.replace_all(items).await.map_err(PlanError::Store)?;
        info!("Saved {} items to the nutrition table", report.stored.len());
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::{food, sample_profile};
    use crate::domain::MealSlot;
    use crate::ports::{PortError, PortResult};
    use crate::reconcile::tests::FakeLookup;
    use crate::table::InMemoryNutritionTable;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeProposer {
        answer: PortResult<String>,
        requests: Mutex<Vec<PlanRequest>>,
    }

    impl FakeProposer {
        fn answering(text: &str) -> Self {
            Self {
                answer: Ok(text.to_string()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                answer: Err(PortError::Unexpected("rate limited".to_string())),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PlanProposalService for FakeProposer {
        async fn propose(&self, request: &PlanRequest) -> PortResult<String> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.answer {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(PortError::Unexpected(e.to_string())),
            }
        }
    }

    const ANSWER: &str = "```json\n{\"user\": \"anaperez\", \"training_day\": true, \"meals\": [\
        {\"name\": \"Meal 1\", \"items\": [{\"food\": \"Oat\", \"amount\": 50}, {\"food\": \"Milk\", \"amount\": 250}]},\
        {\"name\": \"Post-workout\", \"items\": [{\"food\": \"Banana\", \"amount\": 120}]}\
    ]}\n```";

    fn profile() -> BiometricProfile {
        BiometricProfile::new(sample_profile()).unwrap()
    }

    #[tokio::test]
    async fn generate_runs_the_whole_chain() {
        let table = Arc::new(InMemoryNutritionTable::with_items(vec![
            food("Oat", 40.0, 150.0),
            food("Milk", 244.0, 122.0),
        ]));
        let lookup = Arc::new(FakeLookup::with(&[("Banana", food("Banana", 118.0, 105.0))]));
        let proposer = Arc::new(FakeProposer::answering(ANSWER));
        let pipeline = PlanGenerationPipeline::new(table.clone(), lookup, proposer.clone())
            .with_context_size(1);

        let plan = pipeline.generate(&profile(), true).await.unwrap();

        assert_eq!(plan.user, "anaperez");
        assert!(plan.training_day);
        assert_eq!(plan.macros.calories, 2759.0);
        assert_eq!(plan.meals.len(), 2);
        assert_eq!(plan.meals[1].name, MealSlot::PostWorkout);
        assert_eq!(plan.item_count(), 3);
        assert_eq!(table.len(), 3);

        let requests = proposer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].targets, plan.macros);
        assert_eq!(requests[0].food_context.len(), 1);
        assert_eq!(requests[0].food_context[0].name, "Oat");
    }

    #[test]
    fn harris_method_changes_the_targets() {
        let pipeline = PlanGenerationPipeline::new(
            Arc::new(InMemoryNutritionTable::new()),
            Arc::new(FakeLookup::default()),
            Arc::new(FakeProposer::answering(ANSWER)),
        )
        .with_method(CalculationMethod::Harris);

        assert_eq!(pipeline.targets(&profile()).calories, 2890.0);
    }

    #[tokio::test]
    async fn service_failures_and_unparsable_answers_are_fatal() {
        let pipeline = PlanGenerationPipeline::new(
            Arc::new(InMemoryNutritionTable::new()),
            Arc::new(FakeLookup::default()),
            Arc::new(FakeProposer::failing()),
        );
        assert!(matches!(
            pipeline.generate(&profile(), true).await,
            Err(PlanError::ProposalFailed(_))
        ));

        let pipeline = PlanGenerationPipeline::new(
            Arc::new(InMemoryNutritionTable::new()),
            Arc::new(FakeLookup::default()),
            Arc::new(FakeProposer::answering("Sorry, I cannot do that.")),
        );
        let err = pipeline.generate(&profile(), false).await.unwrap_err();
        assert!(matches!(err, PlanError::UnparsableResponse { .. }));
        assert_eq!(err.raw_response(), Some("Sorry, I cannot do that."));
    }

    #[tokio::test]
    async fn refresh_replaces_the_table_with_found_foods() {
        let table = Arc::new(InMemoryNutritionTable::with_items(vec![food("Old", 1.0, 1.0)]));
        let lookup = Arc::new(FakeLookup {
            failing: vec!["milk".to_string()],
            ..FakeLookup::with(&[
                ("egg", food("Egg", 50.0, 72.0)),
                ("EGG", food("egg", 50.0, 72.0)),
                ("oat", food("Oat", 40.0, 150.0)),
            ])
        });
        let pipeline = PlanGenerationPipeline::new(
            table.clone(),
            lookup,
            Arc::new(FakeProposer::answering(ANSWER)),
        );

        let report = pipeline
            .refresh_nutrition_table(&["egg", "EGG", "oat", "milk", "durian"])
            .await
            .unwrap();

        assert_eq!(report.stored, ["Egg", "Oat"]);
        assert_eq!(report.missing, ["milk", "durian"]);
        let names: Vec<String> = table.all().await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["Egg", "Oat"]);
    }
}
