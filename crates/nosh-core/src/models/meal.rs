//! Meal model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a meal, using UUID v7 (time-sortable)
///
/// Server-issued and locally generated identifiers share this namespace, so a
/// record keeps its id across optimistic creation and remote acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MealId(Uuid);

impl MealId {
    /// Create a new unique meal ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for MealId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MealId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A logged meal, the primary synchronized record.
///
/// `is_synced` and `pending_deletion` are the coordination flags between the
/// reconciliation engine and the optimistic delete queue: a record that is
/// unsynced or pending deletion represents a local action the server has not
/// acknowledged, and no background merge may overwrite or retire it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meal {
    /// Unique identifier
    pub id: MealId,
    /// What was eaten
    pub name: String,
    /// Energy in kilocalories
    pub calories: u32,
    /// Calendar day the meal belongs to
    pub eaten_on: chrono::NaiveDate,
    /// Capture timestamp (Unix ms)
    pub logged_at: i64,
    /// True once the server has acknowledged this record
    pub is_synced: bool,
    /// True while a soft delete awaits remote confirmation
    pub pending_deletion: bool,
}

impl Meal {
    /// Create a new locally logged meal, not yet known to the server.
    #[must_use]
    pub fn new(name: impl Into<String>, calories: u32, eaten_on: chrono::NaiveDate) -> Self {
        Self {
            id: MealId::new(),
            name: name.into(),
            calories,
            eaten_on,
            logged_at: chrono::Utc::now().timestamp_millis(),
            is_synced: false,
            pending_deletion: false,
        }
    }

    /// Whether the record may appear in user-facing listings.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.pending_deletion
    }

    /// Whether a remote merge may overwrite or retire this record.
    #[must_use]
    pub const fn is_merge_protected(&self) -> bool {
        !self.is_synced || self.pending_deletion
    }
}
