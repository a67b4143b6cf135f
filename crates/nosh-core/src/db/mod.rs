//! Local persistent store for Nosh

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use repository::{MealStore, SqliteMealStore, SqliteWaterStore, WaterStore};
