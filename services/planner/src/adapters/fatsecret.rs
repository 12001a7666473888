//! services/planner/src/adapters/fatsecret.rs
//!
//! This module contains the adapter for the FatSecret nutrition database.
//! It implements the `NutritionLookupService` port from the `core` crate.
//!
//! A lookup runs `foods.search` for the name and then fetches `food.get.v4` for
//! each candidate until one generic (non-branded) food yields a usable serving.

use async_trait::async_trait;
use meal_plan_core::domain::{ExtendedNutrients, FoodItem};
use meal_plan_core::ports::{NutritionLookupService, PortError, PortResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Reference mass assumed when a serving carries no metric amount.
const DEFAULT_SERVING_GRAMS: f64 = 100.0;

/// Seconds shaved off the token lifetime so it is renewed before it expires.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// An adapter that implements `NutritionLookupService` using the FatSecret REST API.
pub struct FatSecretClient {
    client: Client,
    api_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    max_results: u32,
    token: Mutex<Option<CachedToken>>,
}

impl FatSecretClient {
    /// Creates a new `FatSecretClient`.
    pub fn new(
        client: Client,
        api_url: String,
        token_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            client,
            api_url,
            token_url,
            client_id,
            client_secret,
            max_results: 10,
            token: Mutex::new(None),
        }
    }

    /// Returns a valid access token, requesting a new one when the cached token expired.
    async fn access_token(&self) -> PortResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.access_token.clone());
        }

        debug!("Requesting a new FatSecret access token");
        let response = self
            .client
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials"), ("scope", "basic")])
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("FatSecret token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "FatSecret token request failed with status {}: {}",
                status, text
            )));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            PortError::Unexpected(format!("Failed to parse FatSecret token response: {}", e))
        })?;

        let lifetime = token.expires_in.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS);
        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(access_token)
    }

    /// Calls one method of the REST API and decodes its JSON answer.
    async fn call<T: DeserializeOwned>(&self, params: &[(&str, &str)]) -> PortResult<T> {
        let access_token = self.access_token().await?;

        let response = self
            .client
            .get(&self.api_url)
            .bearer_auth(access_token)
            .query(params)
            .query(&[("format", "json")])
            .send()
            .await
            .map_err(|e| PortError::Unexpected(format!("FatSecret request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PortError::Unexpected(format!(
                "FatSecret request failed with status {}: {}",
                status, text
            )));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| {
            PortError::Unexpected(format!("Failed to parse FatSecret response: {}", e))
        })?;
        decode_response(body)
    }

    async fn search_candidates(&self, food_name: &str) -> PortResult<Vec<SearchHit>> {
        let max_results = self.max_results.to_string();
        let response: SearchResponse = self
            .call(&[
                ("method", "foods.search"),
                ("search_expression", food_name),
                ("max_results", &max_results),
            ])
            .await?;
        Ok(response.foods.food.map(OneOrMany::into_vec).unwrap_or_default())
    }

    async fn food_detail(&self, food_id: &str) -> PortResult<Option<FoodDetail>> {
        let response: FoodResponse = self
            .call(&[("method", "food.get.v4"), ("food_id", food_id)])
            .await?;
        Ok(response.food)
    }
}

/// Turns an API answer into `T`, surfacing the API's own error object.
fn decode_response<T: DeserializeOwned>(body: serde_json::Value) -> PortResult<T> {
    if let Some(error) = body.get("error") {
        return Err(PortError::Unexpected(format!("FatSecret API error: {}", error)));
    }
    serde_json::from_value(body)
        .map_err(|e| PortError::Unexpected(format!("Unexpected FatSecret response: {}", e)))
}

//=========================================================================================
// `NutritionLookupService` Trait Implementation
//=========================================================================================

#[async_trait]
impl NutritionLookupService for FatSecretClient {
    async fn search(&self, food_name: &str) -> PortResult<Option<FoodItem>> {
        let candidates = self.search_candidates(food_name).await?;
        debug!("FatSecret returned {} candidates for '{}'", candidates.len(), food_name);

        for hit in candidates {
            if is_branded(hit.food_type.as_deref()) {
                debug!("Skipping branded food '{}'", hit.food_name);
                continue;
            }

            let Some(detail) = self.food_detail(&hit.food_id.to_string()).await? else {
                warn!("No detail returned for food id {}", hit.food_id);
                continue;
            };
            if is_branded(detail.food_type.as_deref()) {
                debug!("Skipping branded food '{}'", detail.food_name);
                continue;
            }

            if let Some(item) = parse_food_item(detail) {
                info!("Found '{}' for '{}'", item.name, food_name);
                return Ok(Some(item));
            }
        }

        warn!("No generic food with a usable serving found for '{}'", food_name);
        Ok(None)
    }
}

fn is_branded(food_type: Option<&str>) -> bool {
    food_type.is_some_and(|t| t.eq_ignore_ascii_case("brand"))
}

/// Builds a `FoodItem` from the default serving of a food, or its first serving.
fn parse_food_item(detail: FoodDetail) -> Option<FoodItem> {
    let servings = detail.servings?.serving?.into_vec();
    let serving = servings
        .iter()
        .find(|s| s.is_default.as_ref().and_then(Scalar::as_f64) == Some(1.0))
        .or_else(|| servings.first())?;

    let required = |value: &Option<Scalar>, default: f64| match value {
        None => Some(default),
        Some(scalar) => scalar.as_f64(),
    };

    let item = FoodItem {
        name: detail.food_name,
        serving_id: serving
            .serving_id
            .as_ref()
            .and_then(Scalar::as_f64)
            .map(|id| id as i64),
        serving_description: serving.serving_description.clone().unwrap_or_default(),
        grams: required(&serving.metric_serving_amount, DEFAULT_SERVING_GRAMS)?,
        kcal: required(&serving.calories, 0.0)?,
        protein: required(&serving.protein, 0.0)?,
        carbs: required(&serving.carbohydrate, 0.0)?,
        fat: required(&serving.fat, 0.0)?,
        nutrients: ExtendedNutrients {
            fiber: optional(&serving.fiber),
            sugar: optional(&serving.sugar),
            saturated_fat: optional(&serving.saturated_fat),
            trans_fat: optional(&serving.trans_fat),
            monounsaturated_fat: optional(&serving.monounsaturated_fat),
            polyunsaturated_fat: optional(&serving.polyunsaturated_fat),
            cholesterol: optional(&serving.cholesterol),
            sodium: optional(&serving.sodium),
            potassium: optional(&serving.potassium),
            calcium: optional(&serving.calcium),
            iron: optional(&serving.iron),
            vitamin_a: optional(&serving.vitamin_a),
            vitamin_c: optional(&serving.vitamin_c),
            vitamin_d: optional(&serving.vitamin_d),
            added_sugars: optional(&serving.added_sugars),
        },
    };

    if !item.is_usable() {
        warn!("Serving of '{}' has no usable reference mass", item.name);
        return None;
    }
    Some(item)
}

fn optional(value: &Option<Scalar>) -> Option<f64> {
    value.as_ref().and_then(Scalar::as_f64)
}

//=========================================================================================
// API Response Structs
//=========================================================================================

/// The API encodes most numbers as strings, and a single element where a list is expected.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    foods: SearchFoods,
}

#[derive(Debug, Deserialize)]
struct SearchFoods {
    #[serde(default)]
    food: Option<OneOrMany<SearchHit>>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    food_id: Scalar,
    food_name: String,
    #[serde(default)]
    food_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FoodResponse {
    #[serde(default)]
    food: Option<FoodDetail>,
}

#[derive(Debug, Deserialize)]
struct FoodDetail {
    food_name: String,
    #[serde(default)]
    food_type: Option<String>,
    #[serde(default)]
    servings: Option<Servings>,
}

#[derive(Debug, Deserialize)]
struct Servings {
    #[serde(default)]
    serving: Option<OneOrMany<Serving>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Serving {
    serving_id: Option<Scalar>,
    serving_description: Option<String>,
    metric_serving_amount: Option<Scalar>,
    is_default: Option<Scalar>,
    calories: Option<Scalar>,
    carbohydrate: Option<Scalar>,
    protein: Option<Scalar>,
    fat: Option<Scalar>,
    fiber: Option<Scalar>,
    sugar: Option<Scalar>,
    saturated_fat: Option<Scalar>,
    trans_fat: Option<Scalar>,
    monounsaturated_fat: Option<Scalar>,
    polyunsaturated_fat: Option<Scalar>,
    cholesterol: Option<Scalar>,
    sodium: Option<Scalar>,
    potassium: Option<Scalar>,
    calcium: Option<Scalar>,
    iron: Option<Scalar>,
    vitamin_a: Option<Scalar>,
    vitamin_c: Option<Scalar>,
    vitamin_d: Option<Scalar>,
    added_sugars: Option<Scalar>,
}
