//! services/planner/src/adapters/plan_llm.rs
//!
//! This module contains the adapter for the plan-proposing LLM.
//! It implements the `PlanProposalService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = r#"You are an expert nutritionist specialised in sports nutrition and meal planning.

You write one-day meal plans that hit a given set of daily macronutrient targets.

Rules:
- Only give food names and amounts in grams. Do NOT give nutrition facts; they are calculated afterwards.
- Prefer foods with high quality protein, good fiber density and a low relative cost.
- Use common, generic foods. If a food is not very common, name it as precisely as possible.
- The daily total must not exceed the macronutrient targets.
- Never include foods that violate the medical restrictions or the diet type, and respect the other considerations.
- Answer with the JSON object only."#;

const USER_INPUT_TEMPLATE: &str = r#"Create a daily meal plan split into 3 to 7 meals, named only from this list: {slots}.
The plan is for a {day_kind}.

USER:
- Identifier: {user}
- Goal: {goal}
- Sex: {sex}
- Activity level: {activity_level}
- Diet type: {diet_type}
- Medical restrictions: {conditions}
- Other considerations: {notes}

DAILY TARGETS:
- Calories: {calories} kcal
- Protein: {protein} g
- Fat: {fat} g
- Carbohydrates: {carbohydrates} g
- Fiber: {fiber} g

REFERENCE FOODS (per serving, for orientation only):
{food_context}

Answer in JSON with exactly this structure:
{
  "user": "{user}",
  "training_day": {training_day},
  "meals": [
    {
      "name": "Meal 1",
      "items": [
        {"food": "Oat", "amount": 50},
        {"food": "Egg whites", "amount": 120}
      ]
    }
  ]
}"#;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use meal_plan_core::ports::{PlanProposalService, PortError, PortResult};
use meal_plan_core::proposal::PlanRequest;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use tracing::info;

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").unwrap())
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `PlanProposalService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiPlanAdapter {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiPlanAdapter {
    /// Creates a new `OpenAiPlanAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String, temperature: f32) -> Self {
        Self {
            client,
            model,
            temperature,
        }
    }

    /// Renders the user prompt for a plan request.
    pub fn render_prompt(request: &PlanRequest) -> String {
        let slots = request
            .slots
            .iter()
            .map(|slot| format!("\"{}\"", slot))
            .collect::<Vec<_>>()
            .join(", ");
        let conditions = if request.conditions.is_empty() {
            "none".to_string()
        } else {
            request.conditions.join(", ")
        };
        let food_context = if request.food_context.is_empty() {
            "(none available)".to_string()
        } else {
            request.format_food_context()
        };
        let day_kind = if request.training_day {
            "training day"
        } else {
            "rest day"
        };

        let targets = &request.targets;
        let value = |key: &str| -> Option<String> {
            Some(match key {
                "slots" => slots.clone(),
                "day_kind" => day_kind.to_string(),
                "user" => request.user.clone(),
                "goal" => request.goal.to_string(),
                "sex" => request.sex.to_string(),
                "activity_level" => request.activity_level.to_string(),
                "diet_type" => request.diet_type.to_string(),
                "conditions" => conditions.clone(),
                "notes" => request.notes.clone().unwrap_or_else(|| "none".to_string()),
                "calories" => targets.calories.to_string(),
                "protein" => targets.protein.to_string(),
                "fat" => targets.fat.to_string(),
                "carbohydrates" => targets.carbohydrates.to_string(),
                "fiber" => targets.fiber.to_string(),
                "food_context" => food_context.clone(),
                "training_day" => request.training_day.to_string(),
                _ => return None,
            })
        };

        // Single pass: substituted text is never scanned for placeholders again.
        placeholder()
            .replace_all(USER_INPUT_TEMPLATE, |caps: &Captures| {
                value(&caps[1]).unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

//=========================================================================================
// `PlanProposalService` Trait Implementation
//=========================================================================================

#[async_trait]
impl PlanProposalService for OpenAiPlanAdapter {
    /// Asks the model for a meal plan and returns its raw text answer.
    async fn propose(&self, request: &PlanRequest) -> PortResult<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(Self::render_prompt(request))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let completion_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        info!("Requesting a meal plan for '{}' from {}", request.user, self.model);
        let response = self
            .client
            .chat()
            .create(completion_request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected("Plan LLM response contained no text content.".to_string())
            })
    }
}
