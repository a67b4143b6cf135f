//! Wire payload shapes exchanged with the Nosh API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Meal, MealId, WaterLog, WaterLogId};

/// Credential pair returned by the device exchange.
#[derive(Deserialize)]
pub struct TokenPairPayload {
    pub access_token: String,
    pub refresh_token: String,
}

/// A meal record as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealPayload {
    pub id: MealId,
    pub name: String,
    pub calories: u32,
    pub eaten_on: NaiveDate,
    pub logged_at: i64,
}

impl MealPayload {
    /// A server-reported record lands locally already synced.
    #[must_use]
    pub fn into_meal(self) -> Meal {
        Meal {
            id: self.id,
            name: self.name,
            calories: self.calories,
            eaten_on: self.eaten_on,
            logged_at: self.logged_at,
            is_synced: true,
            pending_deletion: false,
        }
    }

    #[must_use]
    pub fn from_meal(meal: &Meal) -> Self {
        Self {
            id: meal.id,
            name: meal.name.clone(),
            calories: meal.calories,
            eaten_on: meal.eaten_on,
            logged_at: meal.logged_at,
        }
    }
}

/// A water log entry as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterLogPayload {
    pub id: WaterLogId,
    pub milliliters: u32,
    pub logged_on: NaiveDate,
    pub logged_at: i64,
}

impl WaterLogPayload {
    #[must_use]
    pub fn into_water_log(self) -> WaterLog {
        WaterLog {
            id: self.id,
            milliliters: self.milliliters,
            logged_on: self.logged_on,
            logged_at: self.logged_at,
            is_synced: true,
        }
    }

    #[must_use]
    pub fn from_water_log(log: &WaterLog) -> Self {
        Self {
            id: log.id,
            milliliters: log.milliliters,
            logged_on: log.logged_on,
            logged_at: log.logged_at,
        }
    }
}

/// User profile and daily targets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProfilePayload {
    pub id: String,
    pub display_name: String,
    pub daily_calorie_target: u32,
    pub daily_water_target_ml: u32,
}

/// Weekly aggregate returned by the summary endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeeklySummaryPayload {
    pub start: NaiveDate,
    pub total_calories: u32,
    pub total_water_ml: u32,
}

/// Monthly aggregate returned by the summary endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonthlySummaryPayload {
    pub year: i32,
    pub month: u32,
    pub total_calories: u32,
    pub total_water_ml: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_meal_lands_synced_and_visible() {
        let payload = MealPayload {
            id: MealId::new(),
            name: "Soup".to_string(),
            calories: 220,
            eaten_on: "2026-02-09".parse().unwrap(),
            logged_at: 1_700_000_000_000,
        };

        let meal = payload.clone().into_meal();
        assert!(meal.is_synced);
        assert!(!meal.pending_deletion);
        assert_eq!(MealPayload::from_meal(&meal), payload);
    }

    #[test]
    fn meal_payload_wire_shape() {
        let json = r#"{
            "id": "018f0d9a-0000-7000-8000-000000000001",
            "name": "Toast",
            "calories": 180,
            "eaten_on": "2026-02-09",
            "logged_at": 1700000000000
        }"#;
        let payload: MealPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.name, "Toast");
        assert_eq!(payload.eaten_on, "2026-02-09".parse().unwrap());
    }
}
