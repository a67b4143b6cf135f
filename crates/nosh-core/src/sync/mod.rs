//! Offline-first synchronization: reconciliation, optimistic deletes, and
//! the service that ties them to the request executor.

pub mod merge;
pub mod soft_delete;

pub use merge::{MergeOutcome, Reconciler, SyncRecord};
pub use soft_delete::{RemoteMealDelete, SoftDeleteQueue, GRACE_WINDOW};

use std::sync::Arc;

use chrono::NaiveDate;

use crate::api::{
    ApiClient, ApiResult, Endpoint, MealPayload, MonthlySummaryPayload, ProfilePayload, Transport,
    UploadPart, WaterLogPayload, WeeklySummaryPayload,
};
use crate::credentials::SecretStore;
use crate::db::{MealStore, WaterStore};
use crate::error::{Error, Result};
use crate::models::{Meal, MealId, WaterLog};

/// Front door for UI-facing callers.
///
/// Reads go through the executor (cache first), successful listing fetches
/// are reconciled into the local store, and mutations apply locally first so
/// they appear instantaneous whatever the network does. Remote fetch
/// failures are swallowed here — stale local data beats no data — but local
/// store failures always propagate.
pub struct SyncService<S, T, M, W>
where
    S: SecretStore + 'static,
    T: Transport + 'static,
    M: MealStore + Clone + 'static,
    W: WaterStore + Clone,
{
    api: Arc<ApiClient<S, T>>,
    meals: M,
    water: W,
    reconciler: Reconciler<M, W>,
    deletes: SoftDeleteQueue<M, ApiClient<S, T>>,
}

impl<S, T, M, W> SyncService<S, T, M, W>
where
    S: SecretStore + 'static,
    T: Transport + 'static,
    M: MealStore + Clone + 'static,
    W: WaterStore + Clone,
{
    pub fn new(api: Arc<ApiClient<S, T>>, meals: M, water: W) -> Self {
        Self {
            reconciler: Reconciler::new(meals.clone(), water.clone()),
            deletes: SoftDeleteQueue::new(meals.clone(), api.clone()),
            api,
            meals,
            water,
        }
    }

    /// Refresh one day's meals from the server and return the visible list.
    ///
    /// Unsynced local captures are uploaded first so the subsequent merge
    /// sees them acknowledged instead of shadowing them forever.
    pub async fn refresh_meals(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        self.push_unsynced_meals(date).await?;

        match self.api.fetch::<Vec<MealPayload>>(Endpoint::Meals { date }).await {
            Ok(payloads) => {
                let remote = payloads.into_iter().map(MealPayload::into_meal).collect();
                self.reconciler.merge_meals(remote, date)?;
            }
            Err(error) => {
                tracing::warn!(%date, "Meal refresh failed, serving local data: {error}");
            }
        }

        self.meals.list_visible(date)
    }

    /// Refresh one day's water logs from the server and return them.
    pub async fn refresh_water(&self, date: NaiveDate) -> Result<Vec<WaterLog>> {
        self.push_unsynced_water(date).await?;

        match self
            .api
            .fetch::<Vec<WaterLogPayload>>(Endpoint::WaterLogs { date })
            .await
        {
            Ok(payloads) => {
                let remote = payloads
                    .into_iter()
                    .map(WaterLogPayload::into_water_log)
                    .collect();
                self.reconciler.merge_water(remote, date)?;
            }
            Err(error) => {
                tracing::warn!(%date, "Water refresh failed, serving local data: {error}");
            }
        }

        self.water.list(date)
    }

    /// Capture a meal locally, then try to upload it.
    ///
    /// The record is returned in its stored state: synced when the server
    /// acknowledged it, unsynced (and merge-protected) when the upload has to
    /// wait for connectivity.
    pub async fn log_meal(
        &self,
        name: impl Into<String>,
        calories: u32,
        date: NaiveDate,
    ) -> Result<Meal> {
        let meal = Meal::new(name, calories, date);
        self.meals.insert_local(&meal)?;

        let body = serde_json::to_value(MealPayload::from_meal(&meal))?;
        match self.api.send(Endpoint::CreateMeal, Some(body)).await {
            Ok(()) => self.meals.mark_synced(&meal.id)?,
            Err(error) => {
                tracing::warn!(meal_id = %meal.id, "Meal saved locally; upload deferred: {error}");
            }
        }

        self.meals
            .get(&meal.id)?
            .ok_or_else(|| Error::NotFound(meal.id.to_string()))
    }

    /// Capture a water log locally, then try to upload it.
    pub async fn log_water(&self, milliliters: u32, date: NaiveDate) -> Result<WaterLog> {
        let log = WaterLog::new(milliliters, date);
        self.water.insert_local(&log)?;

        let body = serde_json::to_value(WaterLogPayload::from_water_log(&log))?;
        match self.api.send(Endpoint::LogWater, Some(body)).await {
            Ok(()) => {
                self.water.mark_synced(&log.id)?;
                let mut log = log;
                log.is_synced = true;
                return Ok(log);
            }
            Err(error) => {
                tracing::warn!(log_id = %log.id, "Water log saved locally; upload deferred: {error}");
            }
        }
        Ok(log)
    }

    /// Edit a logged meal locally, then try to push the change.
    ///
    /// The edit drops the record back to unsynced until the server takes it,
    /// which keeps background merges from clobbering the new values.
    pub async fn update_meal(
        &self,
        id: &MealId,
        name: impl Into<String>,
        calories: u32,
    ) -> Result<Meal> {
        let mut meal = self
            .meals
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        meal.name = name.into();
        meal.calories = calories;
        meal.is_synced = false;
        self.meals.update(&meal)?;

        let body = serde_json::to_value(MealPayload::from_meal(&meal))?;
        match self.api.send(Endpoint::UpdateMeal { id: meal.id }, Some(body)).await {
            Ok(()) => self.meals.mark_synced(&meal.id)?,
            Err(error) => {
                tracing::warn!(meal_id = %meal.id, "Edit saved locally; upload deferred: {error}");
            }
        }

        self.meals
            .get(&meal.id)?
            .ok_or_else(|| Error::NotFound(meal.id.to_string()))
    }

    /// Soft-delete a meal with the undo grace window.
    pub async fn delete_meal(&self, id: &MealId) -> Result<()> {
        self.deletes.soft_delete(id).await
    }

    /// Undo the pending soft delete, if its grace window is still open.
    pub async fn undo_delete(&self) -> Result<Option<Meal>> {
        self.deletes.undo().await
    }

    /// Fetch the user profile (cache-eligible).
    pub async fn profile(&self) -> ApiResult<ProfilePayload> {
        self.api.fetch(Endpoint::Profile).await
    }

    /// Fetch the weekly aggregate starting at `start` (cache-eligible).
    pub async fn weekly_summary(&self, start: NaiveDate) -> ApiResult<WeeklySummaryPayload> {
        self.api.fetch(Endpoint::WeeklySummary { start }).await
    }

    /// Fetch a calendar month aggregate (cache-eligible).
    pub async fn monthly_summary(
        &self,
        year: i32,
        month: u32,
    ) -> ApiResult<MonthlySummaryPayload> {
        self.api.fetch(Endpoint::MonthlySummary { year, month }).await
    }

    /// Attach a photo to a meal via multipart upload.
    pub async fn attach_meal_photo(
        &self,
        id: MealId,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> ApiResult<()> {
        self.api
            .upload(
                Endpoint::UploadMealPhoto { id },
                UploadPart {
                    file_name: file_name.into(),
                    content_type: content_type.into(),
                    bytes,
                },
            )
            .await
    }

    async fn push_unsynced_meals(&self, date: NaiveDate) -> Result<()> {
        for meal in self.meals.list_scope(date)? {
            if meal.is_synced || meal.pending_deletion {
                continue;
            }
            let body = serde_json::to_value(MealPayload::from_meal(&meal))?;
            match self.api.send(Endpoint::CreateMeal, Some(body)).await {
                Ok(()) => self.meals.mark_synced(&meal.id)?,
                Err(error) => {
                    tracing::warn!(meal_id = %meal.id, "Deferred meal upload failed: {error}");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn push_unsynced_water(&self, date: NaiveDate) -> Result<()> {
        for log in self.water.list(date)? {
            if log.is_synced {
                continue;
            }
            let body = serde_json::to_value(WaterLogPayload::from_water_log(&log))?;
            match self.api.send(Endpoint::LogWater, Some(body)).await {
                Ok(()) => self.water.mark_synced(&log.id)?,
                Err(error) => {
                    tracing::warn!(log_id = %log.id, "Deferred water upload failed: {error}");
                    break;
                }
            }
        }
        Ok(())
    }
}
