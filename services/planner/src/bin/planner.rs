//! services/planner/src/bin/planner.rs

use async_openai::{config::OpenAIConfig, Client};
use meal_plan_core::{BiometricProfile, PlanGenerationPipeline, DEFAULT_SEED_FOODS};
use planner_lib::{
    adapters::{CsvNutritionTable, FatSecretClient, OpenAiPlanAdapter},
    config::Config,
    error::AppError,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "planner generate <profile.json> [--rest-day] | planner seed-foods [term ...]";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded.");

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("generate") => generate(&config, &args[1..]).await,
        Some("seed-foods") => seed_foods(&config, &args[1..]).await,
        _ => Err(AppError::Usage(USAGE.to_string())),
    }
}

/// Wires the adapters into the pipeline.
fn build_pipeline(config: &Config, openai_api_key: &str) -> Result<PlanGenerationPipeline, AppError> {
    let (client_id, client_secret) = config.require_food_db_credentials()?;

    let table = Arc::new(CsvNutritionTable::new(config.food_database_file.clone()));
    let lookup = Arc::new(FatSecretClient::new(
        reqwest::Client::new(),
        config.food_database_api.clone(),
        config.food_database_token_url.clone(),
        client_id.to_string(),
        client_secret.to_string(),
    ));

    let openai_config = OpenAIConfig::new().with_api_key(openai_api_key);
    let proposer = Arc::new(OpenAiPlanAdapter::new(
        Client::with_config(openai_config),
        config.plan_model.clone(),
        config.plan_temperature,
    ));

    Ok(PlanGenerationPipeline::new(table, lookup, proposer)
        .with_method(config.macro_method)
        .with_context_size(config.context_foods))
}

async fn generate(config: &Config, args: &[String]) -> Result<(), AppError> {
    let mut profile_path = None;
    let mut training_day = true;
    for arg in args {
        match arg.as_str() {
            "--rest-day" => training_day = false,
            path if profile_path.is_none() => profile_path = Some(path),
            other => return Err(AppError::Usage(format!("unexpected argument '{}'; {}", other, USAGE))),
        }
    }
    let profile_path =
        profile_path.ok_or_else(|| AppError::Usage(format!("missing profile file; {}", USAGE)))?;

    let pipeline = build_pipeline(config, config.require_openai_api_key()?)?;
    let profile: BiometricProfile =
        serde_json::from_str(&tokio::fs::read_to_string(profile_path).await?)?;
    info!(
        "Generating a {} plan for '{}'",
        if training_day { "training day" } else { "rest day" },
        profile.identifier()
    );

    let reconciliation = pipeline.generate_detailed(&profile, training_day).await?;
    for omission in &reconciliation.omissions {
        warn!(
            "Left out {} g of '{}' from {}: {}",
            omission.amount, omission.food, omission.meal, omission.reason
        );
    }

    let plan = &reconciliation.plan;
    let totals = plan.totals();
    info!(
        "Plan totals: {:.0}/{} kcal, {:.1}/{} g protein, {:.1}/{} g fat, {:.1}/{} g carbs ({} items)",
        totals.kcal,
        plan.macros.calories,
        totals.protein,
        plan.macros.protein,
        totals.fat,
        plan.macros.fat,
        totals.carbs,
        plan.macros.carbohydrates,
        plan.item_count()
    );

    println!(
        "{}",
        serde_json::to_string_pretty(plan).map_err(AppError::Output)?
    );
    Ok(())
}

async fn seed_foods(config: &Config, terms: &[String]) -> Result<(), AppError> {
    // Refreshing never calls the language model.
    let pipeline = build_pipeline(config, config.openai_api_key.as_deref().unwrap_or_default())?;

    let report = if terms.is_empty() {
        pipeline.refresh_nutrition_table(&DEFAULT_SEED_FOODS).await?
    } else {
        pipeline.refresh_nutrition_table(terms).await?
    };

    if !report.missing.is_empty() {
        warn!("No usable data for: {}", report.missing.join(", "));
    }
    info!(
        "Stored {} foods in {}",
        report.stored.len(),
        config.food_database_file.display()
    );
    Ok(())
}
