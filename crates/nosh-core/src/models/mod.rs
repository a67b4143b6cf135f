//! Data models for Nosh

mod meal;
mod water;

pub use meal::{Meal, MealId};
pub use water::{WaterLog, WaterLogId};
