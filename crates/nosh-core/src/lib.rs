//! nosh-core - Core library for Nosh
//!
//! This crate contains the offline-first synchronization core shared by all
//! Nosh interfaces: credential lifecycle, response caching, the request
//! executor, the local record store, and local/remote reconciliation.

pub mod api;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use config::CoreConfig;
pub use error::{Error, Result};
pub use models::{Meal, MealId, WaterLog, WaterLogId};
