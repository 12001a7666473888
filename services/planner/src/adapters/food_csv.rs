//! services/planner/src/adapters/food_csv.rs
//!
//! This module contains the file-backed nutrition table, the concrete
//! implementation of the `NutritionTable` port from the `core` crate. The table
//! is a flat CSV file with one row per food; empty optional cells mean "unknown".

use async_trait::async_trait;
use meal_plan_core::domain::{normalize_food_name, ExtendedNutrients, FoodItem};
use meal_plan_core::ports::{NutritionTable, PortError, PortResult};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Column order of the CSV file. Must follow the field order of `FoodRecord`.
pub const COLUMNS: [&str; 23] = [
    "name",
    "serving_id",
    "serving_description",
    "grams",
    "kcal",
    "protein",
    "carbs",
    "fat",
    "fiber",
    "sugar",
    "saturated_fat",
    "trans_fat",
    "monounsaturated_fat",
    "polyunsaturated_fat",
    "cholesterol",
    "sodium",
    "potassium",
    "calcium",
    "iron",
    "vitamin_a",
    "vitamin_c",
    "vitamin_d",
    "added_sugars",
];

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A nutrition table stored in a CSV file. Every call re-reads the file, so
/// several processes can share it.
pub struct CsvNutritionTable {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvNutritionTable {
    /// Creates a new `CsvNutritionTable`. The file is not touched until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> PortResult<Vec<FoodItem>> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => PortError::NotFound(format!(
                "food database file {} wasn't found; generate it first with `planner seed-foods`",
                self.path.display()
            )),
            _ => PortError::Unexpected(format!("failed to read {}: {}", self.path.display(), e)),
        })?;

        csv::Reader::from_reader(bytes.as_slice())
            .deserialize::<FoodRecord>()
            .map(|record| record.map(FoodRecord::to_domain))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                PortError::Unexpected(format!("corrupt food database {}: {}", self.path.display(), e))
            })
    }

    /// Rewrites the whole file. Callers must hold `write_lock`.
    async fn store(&self, items: &[FoodItem]) -> PortResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.write_record(COLUMNS).map_err(csv_error)?;
        for item in items {
            writer
                .serialize(FoodRecord::from_domain(item))
                .map_err(csv_error)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let tmp_path = self.path.with_extension("csv.tmp");
        tokio::fs::write(&tmp_path, bytes).await.map_err(io_error)?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(io_error)?;

        debug!("Wrote {} foods to {}", items.len(), self.path.display());
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> PortError {
    PortError::Unexpected(format!("failed to encode food database: {}", e))
}

fn io_error(e: std::io::Error) -> PortError {
    PortError::Unexpected(format!("failed to write food database: {}", e))
}

//=========================================================================================
// "Impure" CSV Record Struct
//=========================================================================================

#[derive(Serialize, Deserialize)]
struct FoodRecord {
    name: String,
    serving_id: Option<i64>,
    serving_description: String,
    grams: f64,
    kcal: f64,
    protein: f64,
    carbs: f64,
    fat: f64,
    fiber: Option<f64>,
    sugar: Option<f64>,
    saturated_fat: Option<f64>,
    trans_fat: Option<f64>,
    monounsaturated_fat: Option<f64>,
    polyunsaturated_fat: Option<f64>,
    cholesterol: Option<f64>,
    sodium: Option<f64>,
    potassium: Option<f64>,
    calcium: Option<f64>,
    iron: Option<f64>,
    vitamin_a: Option<f64>,
    vitamin_c: Option<f64>,
    vitamin_d: Option<f64>,
    added_sugars: Option<f64>,
}

impl FoodRecord {
    fn from_domain(item: &FoodItem) -> Self {
        let n = &item.nutrients;
        Self {
            name: item.name.clone(),
            serving_id: item.serving_id,
            serving_description: item.serving_description.clone(),
            grams: item.grams,
            kcal: item.kcal,
            protein: item.protein,
            carbs: item.carbs,
            fat: item.fat,
            fiber: n.fiber,
            sugar: n.sugar,
            saturated_fat: n.saturated_fat,
            trans_fat: n.trans_fat,
            monounsaturated_fat: n.monounsaturated_fat,
            polyunsaturated_fat: n.polyunsaturated_fat,
            cholesterol: n.cholesterol,
            sodium: n.sodium,
            potassium: n.potassium,
            calcium: n.calcium,
            iron: n.iron,
            vitamin_a: n.vitamin_a,
            vitamin_c: n.vitamin_c,
            vitamin_d: n.vitamin_d,
            added_sugars: n.added_sugars,
        }
    }

    fn to_domain(self) -> FoodItem {
        FoodItem {
            name: self.name,
            serving_id: self.serving_id,
            serving_description: self.serving_description,
            grams: self.grams,
            kcal: self.kcal,
            protein: self.protein,
            carbs: self.carbs,
            fat: self.fat,
            nutrients: ExtendedNutrients {
                fiber: self.fiber,
                sugar: self.sugar,
                saturated_fat: self.saturated_fat,
                trans_fat: self.trans_fat,
                monounsaturated_fat: self.monounsaturated_fat,
                polyunsaturated_fat: self.polyunsaturated_fat,
                cholesterol: self.cholesterol,
                sodium: self.sodium,
                potassium: self.potassium,
                calcium: self.calcium,
                iron: self.iron,
                vitamin_a: self.vitamin_a,
                vitamin_c: self.vitamin_c,
                vitamin_d: self.vitamin_d,
                added_sugars: self.added_sugars,
            },
        }
    }
}

//=========================================================================================
// `NutritionTable` Trait Implementation
//=========================================================================================

#[async_trait]
impl NutritionTable for CsvNutritionTable {
    async fn find(&self, name: &str) -> PortResult<Option<FoodItem>> {
        let key = normalize_food_name(name);
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|item| item.normalized_name() == key))
    }

    async fn insert(&self, item: FoodItem) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;

        // Re-read under the lock: another writer may have added the food meanwhile.
        let mut items = self.load().await?;
        let key = item.normalized_name();
        if items.iter().any(|existing| existing.normalized_name() == key) {
            return Err(PortError::AlreadyExists(item.name));
        }

        info!("Appending '{}' to {}", item.name, self.path.display());
        items.push(item);
        self.store(&items).await
    }

    async fn all(&self) -> PortResult<Vec<FoodItem>> {
        self.load().await
    }

    async fn replace_all(&self, items: Vec<FoodItem>) -> PortResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store(&items).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn salmon() -> FoodItem {
        FoodItem {
            name: "Cooked Salmon".to_string(),
            serving_id: Some(50321),
            serving_description: "1 fillet".to_string(),
            grams: 154.0,
            kcal: 280.5,
            protein: 39.25,
            carbs: 0.0,
            fat: 12.5,
            nutrients: ExtendedNutrients {
                fiber: Some(0.0),
                sugar: None,
                sodium: Some(86.0),
                vitamin_d: Some(0.1),
                ..ExtendedNutrients::default()
            },
        }
    }

    fn oat() -> FoodItem {
        FoodItem {
            name: "Oat, rolled".to_string(),
            serving_id: None,
            serving_description: String::new(),
            grams: 40.0,
            kcal: 150.0,
            protein: 5.0,
            carbs: 27.0,
            fat: 2.5,
            nutrients: ExtendedNutrients::default(),
        }
    }

    #[tokio::test]
    async fn round_trip_keeps_null_and_zero_apart() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvNutritionTable::new(dir.path().join("databases").join("food.csv"));

        table.replace_all(vec![salmon(), oat()]).await.unwrap();

        let reloaded = CsvNutritionTable::new(table.path()).all().await.unwrap();
        assert_eq!(reloaded, vec![salmon(), oat()]);
        assert_eq!(reloaded[0].nutrients.fiber, Some(0.0));
        assert_eq!(reloaded[0].nutrients.sugar, None);
        assert_eq!(reloaded[1].serving_id, None);
    }

    #[tokio::test]
    async fn file_layout_has_the_documented_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("food.csv");
        let table = CsvNutritionTable::new(&path);

        table.replace_all(vec![oat()]).await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(COLUMNS.join(",").as_str()));
        assert_eq!(
            lines.next(),
            Some("\"Oat, rolled\",,,40.0,150.0,5.0,27.0,2.5,,,,,,,,,,,,,,,")
        );
        assert!(!dir.path().join("food.csv.tmp").exists());
    }

    #[tokio::test]
    async fn insert_then_find_with_any_case() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvNutritionTable::new(dir.path().join("food.csv"));
        table.replace_all(Vec::new()).await.unwrap();

        table.insert(salmon()).await.unwrap();

        for variant in ["cooked salmon", "COOKED SALMON", " Cooked Salmon"] {
            assert_eq!(table.find(variant).await.unwrap(), Some(salmon()));
        }
        assert!(table.contains("cooked salmon").await.unwrap());
        assert!(!table.contains("raw salmon").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("food.csv");
        let first = CsvNutritionTable::new(&path);
        let second = CsvNutritionTable::new(&path);
        first.replace_all(Vec::new()).await.unwrap();

        first.insert(salmon()).await.unwrap();
        let err = second
            .insert(FoodItem { name: "cooked SALMON".to_string(), ..salmon() })
            .await
            .unwrap_err();

        assert!(matches!(err, PortError::AlreadyExists(_)));
        assert_eq!(second.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let table = CsvNutritionTable::new(dir.path().join("absent.csv"));

        assert!(matches!(table.all().await, Err(PortError::NotFound(_))));
        assert!(matches!(table.find("egg").await, Err(PortError::NotFound(_))));
    }
}
