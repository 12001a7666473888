//! services/planner/src/config.rs
//!
//! Defines the planner's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use meal_plan_core::CalculationMethod;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub log_level: Level,
    pub food_database_file: PathBuf,
    pub openai_api_key: Option<String>,
    pub food_db_client_id: Option<String>,
    pub food_db_client_secret: Option<String>,
    pub food_database_api: String,
    pub food_database_token_url: String,
    pub plan_model: String,
    pub plan_temperature: f32,
    pub context_foods: usize,
    pub macro_method: CalculationMethod,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_level = parse_or("RUST_LOG", var("RUST_LOG"), Level::INFO)?;

        let food_database_file = var("FOOD_DATABASE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/databases/food.csv"));

        // --- Load API Credentials (as optional) ---
        let openai_api_key = var("OPENAI_API_KEY");
        let food_db_client_id = var("FOOD_DB_CLIENT_ID");
        let food_db_client_secret = var("FOOD_DB_CLIENT_SECRET");

        // --- Load Adapter-specific Settings ---
        let food_database_api = var("FOOD_DATABASE_API")
            .unwrap_or_else(|| "https://platform.fatsecret.com/rest/server.api".to_string());
        let food_database_token_url = var("FOOD_DATABASE_TOKEN_URL")
            .unwrap_or_else(|| "https://oauth.fatsecret.com/connect/token".to_string());
        let plan_model = var("PLAN_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let plan_temperature = parse_or("PLAN_TEMPERATURE", var("PLAN_TEMPERATURE"), 0.5)?;
        let context_foods = parse_or("PLAN_CONTEXT_FOODS", var("PLAN_CONTEXT_FOODS"), 15)?;
        let macro_method = parse_or(
            "MACRO_METHOD",
            var("MACRO_METHOD"),
            CalculationMethod::Mifflin,
        )?;

        Ok(Self {
            log_level,
            food_database_file,
            openai_api_key,
            food_db_client_id,
            food_db_client_secret,
            food_database_api,
            food_database_token_url,
            plan_model,
            plan_temperature,
            context_foods,
            macro_method,
        })
    }

    /// The OpenAI key, required to generate plans.
    pub fn require_openai_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))
    }

    /// The nutrition database client id and secret.
    pub fn require_food_db_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let id = self
            .food_db_client_id
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("FOOD_DB_CLIENT_ID".to_string()))?;
        let secret = self
            .food_db_client_secret
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVar("FOOD_DB_CLIENT_SECRET".to_string()))?;
        Ok((id, secret))
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            ConfigError::InvalidValue(key.to_string(), format!("'{}' ({})", raw, e))
        }),
        None => Ok(default),
    }
}
