//! Water log model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a water log entry, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaterLogId(Uuid);

impl WaterLogId {
    /// Create a new unique water log ID
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

impl Default for WaterLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WaterLogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WaterLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A water intake entry.
///
/// Water logs sync through the same merge rules as meals but are deleted
/// immediately rather than soft-deleted, so they never set a pending flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaterLog {
    /// Unique identifier
    pub id: WaterLogId,
    /// Amount in milliliters
    pub milliliters: u32,
    /// Calendar day the intake belongs to
    pub logged_on: chrono::NaiveDate,
    /// Capture timestamp (Unix ms)
    pub logged_at: i64,
    /// True once the server has acknowledged this record
    pub is_synced: bool,
}

impl WaterLog {
    /// Create a new locally captured water log, not yet known to the server.
    #[must_use]
    pub fn new(milliliters: u32, logged_on: chrono::NaiveDate) -> Self {
        Self {
            id: WaterLogId::new(),
            milliliters,
            logged_on,
            logged_at: chrono::Utc::now().timestamp_millis(),
            is_synced: false,
        }
    }
}
