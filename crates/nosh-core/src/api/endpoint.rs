//! Closed endpoint catalogue with static cache and invalidation policy.
//!
//! Every remote operation the core performs is one of these variants, so
//! cache eligibility, TTLs, and invalidation topics are checked exhaustively
//! at compile time instead of living in an open-ended string table.

use std::time::Duration;

use chrono::NaiveDate;

use crate::models::MealId;

const LISTING_TTL: Duration = Duration::from_secs(2 * 60);
const PROFILE_TTL: Duration = Duration::from_secs(10 * 60);
const SUMMARY_TTL: Duration = Duration::from_secs(15 * 60);

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

/// Cache invalidation topic, keyed by request-path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Profile,
    Meals,
    Water,
    Summaries,
}

impl Topic {
    /// Cache keys are logical request paths, so a topic is a path prefix.
    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::Profile => "/v1/profile",
            Self::Meals => "/v1/meals",
            Self::Water => "/v1/water",
            Self::Summaries => "/v1/summary",
        }
    }
}

/// Whether and how long an endpoint's response may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Never cached (mutations, auth exchange)
    None,
    /// Idempotent read, cached for the given TTL
    Ttl(Duration),
}

/// A logical remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unauthenticated device-identity exchange for a credential pair
    DeviceExchange,
    /// Current user profile and targets
    Profile,
    /// Meals eaten on a given day
    Meals { date: NaiveDate },
    /// Create a meal record
    CreateMeal,
    /// Update an existing meal record
    UpdateMeal { id: MealId },
    /// Delete a meal record
    DeleteMeal { id: MealId },
    /// Attach a photo to a meal (multipart upload)
    UploadMealPhoto { id: MealId },
    /// Water intake on a given day
    WaterLogs { date: NaiveDate },
    /// Create a water log entry
    LogWater,
    /// Aggregates for the week starting at `start`
    WeeklySummary { start: NaiveDate },
    /// Aggregates for a calendar month
    MonthlySummary { year: i32, month: u32 },
}

impl Endpoint {
    #[must_use]
    pub const fn method(&self) -> Method {
        match self {
            Self::Profile
            | Self::Meals { .. }
            | Self::WaterLogs { .. }
            | Self::WeeklySummary { .. }
            | Self::MonthlySummary { .. } => Method::Get,
            Self::DeviceExchange
            | Self::CreateMeal
            | Self::UploadMealPhoto { .. }
            | Self::LogWater => Method::Post,
            Self::UpdateMeal { .. } => Method::Put,
            Self::DeleteMeal { .. } => Method::Delete,
        }
    }

    /// Logical request path including query, relative to the API base URL.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::DeviceExchange => "/v1/auth/device".to_string(),
            Self::Profile => "/v1/profile".to_string(),
            Self::Meals { date } => format!("/v1/meals?date={date}"),
            Self::CreateMeal => "/v1/meals".to_string(),
            Self::UpdateMeal { id } | Self::DeleteMeal { id } => format!("/v1/meals/{id}"),
            Self::UploadMealPhoto { id } => format!("/v1/meals/{id}/photo"),
            Self::WaterLogs { date } => format!("/v1/water?date={date}"),
            Self::LogWater => "/v1/water".to_string(),
            Self::WeeklySummary { start } => format!("/v1/summary/weekly?start={start}"),
            Self::MonthlySummary { year, month } => {
                format!("/v1/summary/monthly?year={year}&month={month}")
            }
        }
    }

    /// The device exchange is the only unauthenticated operation.
    #[must_use]
    pub const fn requires_auth(&self) -> bool {
        !matches!(self, Self::DeviceExchange)
    }

    #[must_use]
    pub const fn cache_policy(&self) -> CachePolicy {
        match self {
            Self::Profile => CachePolicy::Ttl(PROFILE_TTL),
            Self::Meals { .. } | Self::WaterLogs { .. } => CachePolicy::Ttl(LISTING_TTL),
            Self::WeeklySummary { .. } | Self::MonthlySummary { .. } => {
                CachePolicy::Ttl(SUMMARY_TTL)
            }
            Self::DeviceExchange
            | Self::CreateMeal
            | Self::UpdateMeal { .. }
            | Self::DeleteMeal { .. }
            | Self::UploadMealPhoto { .. }
            | Self::LogWater => CachePolicy::None,
        }
    }

    /// Topics whose cached responses a successful call makes stale.
    #[must_use]
    pub const fn invalidates(&self) -> &'static [Topic] {
        match self {
            Self::CreateMeal
            | Self::UpdateMeal { .. }
            | Self::DeleteMeal { .. }
            | Self::UploadMealPhoto { .. } => &[Topic::Meals, Topic::Summaries],
            Self::LogWater => &[Topic::Water, Topic::Summaries],
            Self::DeviceExchange
            | Self::Profile
            | Self::Meals { .. }
            | Self::WaterLogs { .. }
            | Self::WeeklySummary { .. }
            | Self::MonthlySummary { .. } => &[],
        }
    }

    /// Cache key for cache-eligible reads.
    #[must_use]
    pub fn cache_key(&self) -> String {
        self.path()
    }
}
