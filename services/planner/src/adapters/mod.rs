pub mod fatsecret;
pub mod food_csv;
pub mod plan_llm;

pub use fatsecret::FatSecretClient;
pub use food_csv::CsvNutritionTable;
pub use plan_llm::OpenAiPlanAdapter;
