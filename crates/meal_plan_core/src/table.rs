//! crates/meal_plan_core/src/table.rs
//!
//! An in-memory `NutritionTable`, used by tests and by callers that seed the
//! table themselves.

use crate::domain::{normalize_food_name, FoodItem};
use crate::ports::{NutritionTable, PortError, PortResult};
use async_trait::async_trait;
use std::sync::RwLock;

#[derive(Default)]
pub struct InMemoryNutritionTable {
    items: RwLock<Vec<FoodItem>>,
}

impl InMemoryNutritionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table holding `items` as-is, duplicates included.
    pub fn with_items(items: Vec<FoodItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> PortError {
    PortError::Unexpected("nutrition table lock poisoned".to_string())
}

#[async_trait]
impl NutritionTable for InMemoryNutritionTable {
    async fn find(&self, name: &str) -> PortResult<Option<FoodItem>> {
        let key = normalize_food_name(name);
        let items = self.items.read().map_err(poisoned)?;
        Ok(items.iter().find(|item| item.normalized_name() == key).cloned())
    }

    async fn insert(&self, item: FoodItem) -> PortResult<()> {
        let key = item.normalized_name();
        let mut items = self.items.write().map_err(poisoned)?;
        if items.iter().any(|existing| existing.normalized_name() == key) {
            return Err(PortError::AlreadyExists(item.name));
        }
        items.push(item);
        Ok(())
    }

    async fn all(&self) -> PortResult<Vec<FoodItem>> {
        Ok(self.items.read().map_err(poisoned)?.clone())
    }

    async fn replace_all(&self, items: Vec<FoodItem>) -> PortResult<()> {
        *self.items.write().map_err(poisoned)? = items;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tests::food;

    #[tokio::test]
    async fn insert_then_find_ignores_case() {
        let table = InMemoryNutritionTable::new();
        table.insert(food("Cooked Salmon", 100.0, 208.0)).await.unwrap();

        for variant in ["cooked salmon", "COOKED SALMON", "  Cooked salmon "] {
            let found = table.find(variant).await.unwrap().unwrap();
            assert_eq!(found.name, "Cooked Salmon");
            assert!(table.contains(variant).await.unwrap());
        }
        assert!(!table.contains("salmon").await.unwrap());
    }

    #[tokio::test]
    async fn second_insert_of_same_name_is_rejected() {
        let table = InMemoryNutritionTable::new();
        table.insert(food("Egg", 50.0, 72.0)).await.unwrap();

        let err = table.insert(food("EGG", 60.0, 80.0)).await.unwrap_err();
        assert!(matches!(err, PortError::AlreadyExists(name) if name == "EGG"));
        assert_eq!(table.len(), 1);
        assert_eq!(table.find("egg").await.unwrap().unwrap().grams, 50.0);
    }

    #[tokio::test]
    async fn find_returns_first_duplicate() {
        let table = InMemoryNutritionTable::with_items(vec![
            food("Milk", 244.0, 122.0),
            food("milk", 100.0, 50.0),
        ]);
        assert_eq!(table.find("MILK").await.unwrap().unwrap().grams, 244.0);
    }

    #[tokio::test]
    async fn replace_all_discards_previous_rows() {
        let table = InMemoryNutritionTable::with_items(vec![food("Milk", 244.0, 122.0)]);
        table
            .replace_all(vec![food("Oat", 40.0, 150.0), food("Banana", 118.0, 105.0)])
            .await
            .unwrap();

        let names: Vec<String> = table.all().await.unwrap().into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["Oat", "Banana"]);
        assert!(!table.contains("milk").await.unwrap());
    }
}
