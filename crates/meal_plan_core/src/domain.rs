//! crates/meal_plan_core/src/domain.rs
//!
//! Defines the core data structures of the meal planner: the biometric profile a
//! plan is generated for, the macro targets derived from it, the food items of the
//! nutrition table and the meal plan assembled from them.

use crate::macros::MacroError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

//=========================================================================================
// Profile Enumerations
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("male"),
            Sex::Female => f.write_str("female"),
        }
    }
}

/// How active the person is outside of planned training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ActivityLevel {
    Sedentary,
    Low,
    Medium,
    High,
}

impl ActivityLevel {
    /// Multiplier applied to the basal metabolic rate to get the TDEE.
    pub fn factor(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Low => 1.375,
            ActivityLevel::Medium => 1.55,
            ActivityLevel::High => 1.725,
        }
    }
}

impl FromStr for ActivityLevel {
    type Err = MacroError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sedentary" => Ok(ActivityLevel::Sedentary),
            "low" => Ok(ActivityLevel::Low),
            "medium" => Ok(ActivityLevel::Medium),
            "high" => Ok(ActivityLevel::High),
            _ => Err(MacroError::UnknownActivityLevel(s.to_string())),
        }
    }
}

impl TryFrom<String> for ActivityLevel {
    type Error = MacroError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for ActivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::Low => "low",
            ActivityLevel::Medium => "medium",
            ActivityLevel::High => "high",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    WeightLoss,
    GainMuscle,
    BodyRecomposition,
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Goal::WeightLoss => "weight loss",
            Goal::GainMuscle => "gain muscle",
            Goal::BodyRecomposition => "body recomposition",
        };
        f.write_str(label)
    }
}

/// Where the person trains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Implementation {
    Gym,
    Bodyweight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DietType {
    #[default]
    Omnivore,
    Vegetarian,
    Vegan,
}

impl fmt::Display for DietType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DietType::Omnivore => "omnivore",
            DietType::Vegetarian => "vegetarian",
            DietType::Vegan => "vegan",
        };
        f.write_str(label)
    }
}

//=========================================================================================
// Biometric Profile
//=========================================================================================

/// Errors raised while validating a `NewProfile`.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProfileError {
    #[error("The profile name must not be empty")]
    EmptyName,
    #[error("Age must be greater than zero")]
    InvalidAge,
    #[error("Weight must be a positive number of kilograms, got {0}")]
    InvalidWeight(f64),
    #[error("Height must be a positive number of centimetres, got {0}")]
    InvalidHeight(f64),
    #[error("Training days must be between 2 and 7, got {0}")]
    TrainingDaysOutOfRange(u8),
}

/// Unvalidated profile input, as read from a request or a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub age: u32,
    pub weight: f64,
    pub height: f64,
    pub sex: Sex,
    pub activity_level: ActivityLevel,
    pub implementation: Implementation,
    pub goal: Goal,
    pub training_days: u8,
    #[serde(default)]
    pub conditions: Vec<String>,
    #[serde(default)]
    pub diet_type: DietType,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A validated biometric profile. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NewProfile")]
pub struct BiometricProfile {
    name: String,
    age: u32,
    weight: f64,
    height: f64,
    sex: Sex,
    activity_level: ActivityLevel,
    implementation: Implementation,
    goal: Goal,
    training_days: u8,
    conditions: Vec<String>,
    diet_type: DietType,
    notes: Option<String>,
}

impl BiometricProfile {
    pub const TRAINING_DAYS: std::ops::RangeInclusive<u8> = 2..=7;

    pub fn new(input: NewProfile) -> Result<Self, ProfileError> {
        if input.name.trim().is_empty() {
            return Err(ProfileError::EmptyName);
        }
        if input.age == 0 {
            return Err(ProfileError::InvalidAge);
        }
        if !(input.weight.is_finite() && input.weight > 0.0) {
            return Err(ProfileError::InvalidWeight(input.weight));
        }
        if !(input.height.is_finite() && input.height > 0.0) {
            return Err(ProfileError::InvalidHeight(input.height));
        }
        if !Self::TRAINING_DAYS.contains(&input.training_days) {
            return Err(ProfileError::TrainingDaysOutOfRange(input.training_days));
        }

        Ok(Self {
            name: input.name,
            age: input.age,
            weight: input.weight,
            height: input.height,
            sex: input.sex,
            activity_level: input.activity_level,
            implementation: input.implementation,
            goal: input.goal,
            training_days: input.training_days,
            conditions: input.conditions,
            diet_type: input.diet_type,
            notes: input.notes,
        })
    }

    /// The user tag a plan is generated for: the lower-cased name without whitespace.
    pub fn identifier(&self) -> String {
        self.name
            .split_whitespace()
            .collect::<String>()
            .to_lowercase()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn age(&self) -> u32 {
        self.age
    }
    /// Body weight in kilograms.
    pub fn weight(&self) -> f64 {
        self.weight
    }
    /// Height in centimetres.
    pub fn height(&self) -> f64 {
        self.height
    }
    pub fn sex(&self) -> Sex {
        self.sex
    }
    pub fn activity_level(&self) -> ActivityLevel {
        self.activity_level
    }
    pub fn implementation(&self) -> Implementation {
        self.implementation
    }
    pub fn goal(&self) -> Goal {
        self.goal
    }
    pub fn training_days(&self) -> u8 {
        self.training_days
    }
    /// Medical condition tags, e.g. "diabetic" or "celiac".
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }
    pub fn diet_type(&self) -> DietType {
        self.diet_type
    }
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

impl TryFrom<NewProfile> for BiometricProfile {
    type Error = ProfileError;

    fn try_from(input: NewProfile) -> Result<Self, Self::Error> {
        Self::new(input)
    }
}

/// Daily energy and macronutrient targets derived from a `BiometricProfile`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroTargets {
    pub protein: f64,
    pub fat: f64,
    pub carbohydrates: f64,
    pub calories: f64,
    pub fiber: f64,
}

//=========================================================================================
// Food Items
//=========================================================================================

/// Normalizes a food name into the natural key used by the nutrition table.
pub fn normalize_food_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Optional nutrients of a food item. `None` means the value is unknown,
/// which is not the same thing as a value of zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedNutrients {
    pub fiber: Option<f64>,
    pub sugar: Option<f64>,
    pub saturated_fat: Option<f64>,
    pub trans_fat: Option<f64>,
    pub monounsaturated_fat: Option<f64>,
    pub polyunsaturated_fat: Option<f64>,
    /// mg
    pub cholesterol: Option<f64>,
    /// mg
    pub sodium: Option<f64>,
    /// mg
    pub potassium: Option<f64>,
    /// mg
    pub calcium: Option<f64>,
    /// mg
    pub iron: Option<f64>,
    /// µg
    pub vitamin_a: Option<f64>,
    /// mg
    pub vitamin_c: Option<f64>,
    /// µg
    pub vitamin_d: Option<f64>,
    pub added_sugars: Option<f64>,
}

/// Nutrition facts of one food for its reference serving (`grams`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub name: String,
    pub serving_id: Option<i64>,
    pub serving_description: String,
    /// Mass of the reference serving in grams.
    pub grams: f64,
    pub kcal: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(flatten)]
    pub nutrients: ExtendedNutrients,
}

impl FoodItem {
    pub fn normalized_name(&self) -> String {
        normalize_food_name(&self.name)
    }

    /// Whether per-gram math can be done with this item.
    pub fn is_usable(&self) -> bool {
        !self.name.trim().is_empty() && self.grams.is_finite() && self.grams > 0.0
    }

    /// Energy and macros contained in a single gram of this food.
    pub fn macros_per_gram(&self) -> Nutrition {
        if self.grams <= 0.0 {
            return Nutrition::default();
        }
        Nutrition {
            kcal: self.kcal / self.grams,
            protein: self.protein / self.grams,
            carbs: self.carbs / self.grams,
            fat: self.fat / self.grams,
        }
    }
}

/// Energy and macros of some quantity of food.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Nutrition {
    pub kcal: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
}

impl Nutrition {
    pub fn scaled(self, factor: f64) -> Self {
        Self {
            kcal: self.kcal * factor,
            protein: self.protein * factor,
            carbs: self.carbs * factor,
            fat: self.fat * factor,
        }
    }
}

impl Add for Nutrition {
    type Output = Nutrition;

    fn add(self, rhs: Nutrition) -> Nutrition {
        Nutrition {
            kcal: self.kcal + rhs.kcal,
            protein: self.protein + rhs.protein,
            carbs: self.carbs + rhs.carbs,
            fat: self.fat + rhs.fat,
        }
    }
}

impl std::iter::Sum for Nutrition {
    fn sum<I: Iterator<Item = Nutrition>>(iter: I) -> Self {
        iter.fold(Nutrition::default(), Add::add)
    }
}

//=========================================================================================
// Meals and Plans
//=========================================================================================

/// A meal slot name that is not one of the fixed `MealSlot` labels.
#[derive(Debug, thiserror::Error, PartialEq)]
#[error("Unknown meal slot: '{0}'")]
pub struct UnknownMealSlot(pub String);

/// The fixed set of named meals within a daily plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MealSlot {
    Meal1,
    Meal2,
    Meal3,
    Meal4,
    Snack,
    PreWorkout,
    PostWorkout,
}

impl MealSlot {
    pub const ALL: [MealSlot; 7] = [
        MealSlot::Meal1,
        MealSlot::Meal2,
        MealSlot::Meal3,
        MealSlot::Meal4,
        MealSlot::Snack,
        MealSlot::PreWorkout,
        MealSlot::PostWorkout,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MealSlot::Meal1 => "Meal 1",
            MealSlot::Meal2 => "Meal 2",
            MealSlot::Meal3 => "Meal 3",
            MealSlot::Meal4 => "Meal 4",
            MealSlot::Snack => "Snack",
            MealSlot::PreWorkout => "Pre-workout",
            MealSlot::PostWorkout => "Post-workout",
        }
    }
}

impl fmt::Display for MealSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MealSlot {
    type Err = UnknownMealSlot;

    /// Case-insensitive; spaces, hyphens and underscores are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "meal1" => Ok(MealSlot::Meal1),
            "meal2" => Ok(MealSlot::Meal2),
            "meal3" => Ok(MealSlot::Meal3),
            "meal4" => Ok(MealSlot::Meal4),
            "snack" => Ok(MealSlot::Snack),
            "preworkout" => Ok(MealSlot::PreWorkout),
            "postworkout" => Ok(MealSlot::PostWorkout),
            _ => Err(UnknownMealSlot(s.to_string())),
        }
    }
}

impl TryFrom<String> for MealSlot {
    type Error = UnknownMealSlot;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MealSlot> for String {
    fn from(slot: MealSlot) -> Self {
        slot.label().to_string()
    }
}

/// An amount of one food included in a meal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealItem {
    pub food: FoodItem,
    /// Grams of the food; independent of the food's reference serving.
    pub amount: u32,
}

impl MealItem {
    /// Nutrition of this item, scaled linearly by `amount / food.grams`.
    pub fn nutrition(&self) -> Nutrition {
        self.food.macros_per_gram().scaled(f64::from(self.amount))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub name: MealSlot,
    pub items: Vec<MealItem>,
}

impl Meal {
    pub fn totals(&self) -> Nutrition {
        self.items.iter().map(MealItem::nutrition).sum()
    }
}

/// One day's plan, either for a training day or a rest day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealsPlan {
    pub user: String,
    pub training_day: bool,
    pub macros: MacroTargets,
    pub meals: Vec<Meal>,
}

impl MealsPlan {
    pub fn totals(&self) -> Nutrition {
        self.meals.iter().map(Meal::totals).sum()
    }

    pub fn item_count(&self) -> usize {
        self.meals.iter().map(|meal| meal.items.len()).sum()
    }
}
