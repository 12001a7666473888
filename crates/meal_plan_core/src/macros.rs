//! crates/meal_plan_core/src/macros.rs
//!
//! Computes daily energy and macronutrient targets from a biometric profile.
//! Everything here is pure: the same profile and method always produce the same
//! `MacroTargets`.

use crate::domain::{BiometricProfile, MacroTargets, Sex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PROTEIN_G_PER_KG: f64 = 2.0;
const FAT_G_PER_KG: f64 = 0.9;

const KCAL_PER_G_PROTEIN: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;
const KCAL_PER_G_CARBS: f64 = 4.0;

/// Base of the fiber heuristic; one more gram is added per 10 kg of bodyweight.
const FIBER_BASE_G: f64 = 15.0;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum MacroError {
    #[error("Unknown macro calculation method: {0}")]
    InvalidMethod(String),
    #[error("Unknown activity level: {0}")]
    UnknownActivityLevel(String),
}

/// Formula used for the basal metabolic rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculationMethod {
    /// Mifflin-St Jeor.
    #[default]
    Mifflin,
    /// Revised Harris-Benedict.
    Harris,
}

impl FromStr for CalculationMethod {
    type Err = MacroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "mifflin" => Ok(CalculationMethod::Mifflin),
            "harris" => Ok(CalculationMethod::Harris),
            _ => Err(MacroError::InvalidMethod(s.to_string())),
        }
    }
}

impl fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculationMethod::Mifflin => f.write_str("mifflin"),
            CalculationMethod::Harris => f.write_str("harris"),
        }
    }
}

pub struct MacroCalculator;

impl MacroCalculator {
    /// Basal metabolic rate in kcal/day.
    pub fn basal_metabolic_rate(profile: &BiometricProfile, method: CalculationMethod) -> f64 {
        let weight = profile.weight();
        let height = profile.height();
        let age = f64::from(profile.age());

        match (method, profile.sex()) {
            (CalculationMethod::Mifflin, Sex::Male) => 10.0 * weight + 6.25 * height - 5.0 * age + 5.0,
            (CalculationMethod::Mifflin, Sex::Female) => {
                10.0 * weight + 6.25 * height - 5.0 * age - 161.0
            }
            (CalculationMethod::Harris, Sex::Male) => {
                66.5 + 13.75 * weight + 5.003 * height - 6.75 * age
            }
            (CalculationMethod::Harris, Sex::Female) => {
                655.1 + 9.563 * weight + 1.850 * height - 4.676 * age
            }
        }
    }

    /// Total daily energy expenditure: the BMR scaled by the activity factor.
    pub fn total_daily_energy_expenditure(
        profile: &BiometricProfile,
        method: CalculationMethod,
    ) -> f64 {
        Self::basal_metabolic_rate(profile, method) * profile.activity_level().factor()
    }

    pub fn compute(profile: &BiometricProfile, method: CalculationMethod) -> MacroTargets {
        let tdee = Self::total_daily_energy_expenditure(profile, method);
        let weight = profile.weight();

        let grams_protein = weight * PROTEIN_G_PER_KG;
        let grams_fat = weight * FAT_G_PER_KG;

        let kcal_remaining =
            tdee - grams_protein * KCAL_PER_G_PROTEIN - grams_fat * KCAL_PER_G_FAT;
        let grams_carbs = (kcal_remaining / KCAL_PER_G_CARBS).max(0.0);

        let fiber = FIBER_BASE_G + (weight / 10.0).floor();

        MacroTargets {
            protein: round_to_tenth(grams_protein),
            fat: round_to_tenth(grams_fat),
            carbohydrates: round_to_tenth(grams_carbs),
            calories: tdee.round(),
            fiber: round_to_tenth(fiber),
        }
    }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
