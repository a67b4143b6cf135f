//! Optimistic soft delete with a grace-period undo.
//!
//! A deletion is applied to the visible store immediately and confirmed
//! remotely only after the grace window passes without an undo. One pending
//! deletion is live at a time; a newer soft delete supersedes the previous
//! timer via cancel-and-replace, so no record's delete is ever confirmed
//! twice.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::api::{ApiClient, ApiResult, Endpoint, Transport};
use crate::credentials::SecretStore;
use crate::db::MealStore;
use crate::error::{Error, Result};
use crate::models::{Meal, MealId};

/// How long the user can undo before the remote delete is issued.
pub const GRACE_WINDOW: Duration = Duration::from_secs(3);

/// Remote confirmation seam for the delete queue.
#[async_trait]
pub trait RemoteMealDelete: Send + Sync + 'static {
    async fn delete_meal(&self, id: MealId) -> ApiResult<()>;
}

#[async_trait]
impl<S, T> RemoteMealDelete for ApiClient<S, T>
where
    S: SecretStore + 'static,
    T: Transport + 'static,
{
    async fn delete_meal(&self, id: MealId) -> ApiResult<()> {
        self.send(Endpoint::DeleteMeal { id }, None).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeletePhase {
    /// Hidden locally, grace timer running
    Active,
    /// Restored before the timer fired; no remote call was or will be made
    Undone,
    /// Grace window elapsed; the local deletion is final
    Confirmed,
}

struct PendingDelete {
    generation: u64,
    meal: Meal,
    phase: DeletePhase,
    timer: Option<JoinHandle<()>>,
}

struct DeleteSlot {
    next_generation: u64,
    pending: Option<PendingDelete>,
}

/// Queue of at most one pending optimistic deletion.
pub struct SoftDeleteQueue<M, R>
where
    M: MealStore + Clone + 'static,
    R: RemoteMealDelete,
{
    store: M,
    remote: Arc<R>,
    slot: Arc<Mutex<DeleteSlot>>,
}

impl<M, R> SoftDeleteQueue<M, R>
where
    M: MealStore + Clone + 'static,
    R: RemoteMealDelete,
{
    pub fn new(store: M, remote: Arc<R>) -> Self {
        Self {
            store,
            remote,
            slot: Arc::new(Mutex::new(DeleteSlot {
                next_generation: 0,
                pending: None,
            })),
        }
    }

    /// Hide the record immediately and start the undo grace window.
    ///
    /// If another deletion is still pending, it is superseded: its timer is
    /// cancelled and its local deletion is finalized on the spot, without a
    /// remote confirmation of its own.
    pub async fn soft_delete(&self, id: &MealId) -> Result<()> {
        let meal = self
            .store
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        self.store.set_pending_deletion(id, true)?;

        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.pending.take() {
            if previous.phase == DeletePhase::Active {
                if let Some(timer) = previous.timer {
                    timer.abort();
                }
                self.store.delete(&previous.meal.id)?;
                tracing::warn!(
                    meal_id = %previous.meal.id,
                    "Pending delete superseded; finalized locally without remote confirmation"
                );
            }
        }

        slot.next_generation += 1;
        let generation = slot.next_generation;
        slot.pending = Some(PendingDelete {
            generation,
            meal,
            phase: DeletePhase::Active,
            timer: None,
        });

        let timer = tokio::spawn(confirm_after_grace(
            self.store.clone(),
            self.remote.clone(),
            self.slot.clone(),
            generation,
        ));
        if let Some(pending) = slot.pending.as_mut() {
            pending.timer = Some(timer);
        }

        tracing::debug!(meal_id = %id, "Soft-deleted meal, grace window started");
        Ok(())
    }

    /// Restore the pending record if the grace window has not elapsed.
    ///
    /// Returns the restored meal, or `None` when there was nothing left to
    /// undo (no pending delete, or its remote confirmation already went out).
    pub async fn undo(&self) -> Result<Option<Meal>> {
        let mut slot = self.slot.lock().await;
        match slot.pending.as_mut() {
            Some(pending) if pending.phase == DeletePhase::Active => {
                pending.phase = DeletePhase::Undone;
                if let Some(timer) = pending.timer.take() {
                    timer.abort();
                }
                let meal = pending.meal.clone();
                self.store.set_pending_deletion(&meal.id, false)?;
                tracing::info!(meal_id = %meal.id, "Soft delete undone");
                Ok(Some(meal))
            }
            _ => Ok(None),
        }
    }
}

/// Grace timer body. The phase is re-checked under the slot lock before any
/// action, so a callback that lost to an undo or a supersede does nothing.
async fn confirm_after_grace<M, R>(
    store: M,
    remote: Arc<R>,
    slot: Arc<Mutex<DeleteSlot>>,
    generation: u64,
) where
    M: MealStore + Clone + 'static,
    R: RemoteMealDelete,
{
    tokio::time::sleep(GRACE_WINDOW).await;

    let meal = {
        let mut slot = slot.lock().await;
        match slot.pending.as_mut() {
            Some(pending)
                if pending.generation == generation && pending.phase == DeletePhase::Active =>
            {
                pending.phase = DeletePhase::Confirmed;
                Some(pending.meal.clone())
            }
            _ => None,
        }
    };
    let Some(meal) = meal else {
        return;
    };

    if let Err(error) = store.delete(&meal.id) {
        tracing::error!(meal_id = %meal.id, "Failed to finalize local deletion: {error}");
        return;
    }

    // The user's deletion stands whatever the server says; a failure here is
    // reported, not compensated.
    if let Err(error) = remote.delete_meal(meal.id).await {
        tracing::warn!(meal_id = %meal.id, "Remote delete confirmation failed: {error}");
    }
}
