//! Smart merge: upsert remote records locally without destroying local
//! mutations the server has not seen yet.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use chrono::NaiveDate;

use crate::db::{MealStore, WaterStore};
use crate::error::Result;
use crate::models::{Meal, MealId, WaterLog, WaterLogId};

/// A record that participates in local/remote reconciliation.
pub trait SyncRecord {
    type Id: Copy + Eq + Hash;

    fn record_id(&self) -> Self::Id;
    fn is_synced(&self) -> bool;
    fn is_pending_deletion(&self) -> bool;
}

impl SyncRecord for Meal {
    type Id = MealId;

    fn record_id(&self) -> MealId {
        self.id
    }

    fn is_synced(&self) -> bool {
        self.is_synced
    }

    fn is_pending_deletion(&self) -> bool {
        self.pending_deletion
    }
}

impl SyncRecord for WaterLog {
    type Id = WaterLogId;

    fn record_id(&self) -> WaterLogId {
        self.id
    }

    fn is_synced(&self) -> bool {
        self.is_synced
    }

    fn is_pending_deletion(&self) -> bool {
        false
    }
}

/// What a merge did, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Local records left untouched because they carry unsynced or
    /// pending-deletion state the server does not know about.
    pub protected: usize,
}

struct MergePlan<R: SyncRecord> {
    upserts: Vec<R>,
    deletes: Vec<R::Id>,
    outcome: MergeOutcome,
}

/// Decide the merge, given the remote listing and the local records in the
/// same scope.
///
/// Remote records overwrite only synced, non-pending local counterparts;
/// everything else local is a user action in flight and wins. Synced local
/// records absent from the remote set were deleted elsewhere and are retired.
fn plan_merge<R: SyncRecord>(remote: Vec<R>, local: &[R]) -> MergePlan<R> {
    let remote_ids: HashSet<R::Id> = remote.iter().map(SyncRecord::record_id).collect();
    let local_by_id: HashMap<R::Id, &R> = local
        .iter()
        .map(|record| (record.record_id(), record))
        .collect();

    let mut plan = MergePlan {
        upserts: Vec::new(),
        deletes: Vec::new(),
        outcome: MergeOutcome::default(),
    };

    for record in remote {
        match local_by_id.get(&record.record_id()) {
            Some(existing) if !existing.is_synced() || existing.is_pending_deletion() => {
                plan.outcome.protected += 1;
            }
            Some(_) => {
                plan.outcome.updated += 1;
                plan.upserts.push(record);
            }
            None => {
                plan.outcome.inserted += 1;
                plan.upserts.push(record);
            }
        }
    }

    for record in local {
        if record.is_synced()
            && !record.is_pending_deletion()
            && !remote_ids.contains(&record.record_id())
        {
            plan.outcome.deleted += 1;
            plan.deletes.push(record.record_id());
        }
    }

    plan
}

/// Applies remote listings to the local store with the smart-merge rules.
pub struct Reconciler<M: MealStore, W: WaterStore> {
    meals: M,
    water: W,
}

impl<M: MealStore, W: WaterStore> Reconciler<M, W> {
    pub const fn new(meals: M, water: W) -> Self {
        Self { meals, water }
    }

    /// Merge a remote meal listing for one day into the local store.
    ///
    /// The whole merge commits as one transaction; readers never observe a
    /// partially merged day.
    pub fn merge_meals(&self, remote: Vec<Meal>, date: NaiveDate) -> Result<MergeOutcome> {
        let local = self.meals.list_scope(date)?;
        let plan = plan_merge(remote, &local);
        self.meals.apply_merge(&plan.upserts, &plan.deletes)?;
        tracing::debug!(%date, outcome = ?plan.outcome, "Merged remote meals");
        Ok(plan.outcome)
    }

    /// Merge a remote water-log listing for one day into the local store.
    pub fn merge_water(&self, remote: Vec<WaterLog>, date: NaiveDate) -> Result<MergeOutcome> {
        let local = self.water.list(date)?;
        let plan = plan_merge(remote, &local);
        self.water.apply_merge(&plan.upserts, &plan.deletes)?;
        tracing::debug!(%date, outcome = ?plan.outcome, "Merged remote water logs");
        Ok(plan.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn synced_meal(name: &str, day: &str) -> Meal {
        let mut meal = Meal::new(name, 100, date(day));
        meal.is_synced = true;
        meal
    }

    fn reconciler(db: &Database) -> Reconciler<crate::db::SqliteMealStore, crate::db::SqliteWaterStore> {
        Reconciler::new(db.meal_store(), db.water_store())
    }

    #[test]
    fn remote_records_insert_as_synced() {
        let db = Database::open_in_memory().unwrap();
        let outcome = reconciler(&db)
            .merge_meals(vec![synced_meal("Toast", "2026-02-09")], date("2026-02-09"))
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        let stored = db.meal_store().list_visible(date("2026-02-09")).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].is_synced);
    }

    #[test]
    fn remote_fields_overwrite_synced_local_counterpart() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();

        let meal = synced_meal("Old name", "2026-02-09");
        store.insert_local(&meal).unwrap();

        let mut newer = meal.clone();
        newer.name = "New name".to_string();
        newer.calories = 450;

        let outcome = reconciler(&db)
            .merge_meals(vec![newer], date("2026-02-09"))
            .unwrap();

        assert_eq!(outcome.updated, 1);
        let stored = store.get(&meal.id).unwrap().unwrap();
        assert_eq!(stored.name, "New name");
        assert_eq!(stored.calories, 450);
    }

    #[test]
    fn merge_protects_unsynced_records() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();

        // Local capture the server has never seen; remote listing omits it.
        let local_only = Meal::new("Offline snack", 200, date("2026-02-09"));
        store.insert_local(&local_only).unwrap();

        let outcome = reconciler(&db)
            .merge_meals(vec![synced_meal("Lunch", "2026-02-09")], date("2026-02-09"))
            .unwrap();

        assert_eq!(outcome.deleted, 0);
        let stored = store.get(&local_only.id).unwrap().unwrap();
        assert_eq!(stored, local_only);
    }

    #[test]
    fn merge_never_overwrites_unsynced_counterpart() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();

        let local = Meal::new("Local edit", 333, date("2026-02-09"));
        store.insert_local(&local).unwrap();

        let mut remote_version = local.clone();
        remote_version.name = "Server version".to_string();
        remote_version.is_synced = true;

        let outcome = reconciler(&db)
            .merge_meals(vec![remote_version], date("2026-02-09"))
            .unwrap();

        assert_eq!(outcome.protected, 1);
        assert_eq!(store.get(&local.id).unwrap().unwrap().name, "Local edit");
    }

    #[test]
    fn merge_retires_server_deleted_records() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();

        let gone_elsewhere = synced_meal("Deleted on phone", "2026-02-09");
        store.insert_local(&gone_elsewhere).unwrap();

        let outcome = reconciler(&db)
            .merge_meals(Vec::new(), date("2026-02-09"))
            .unwrap();

        assert_eq!(outcome.deleted, 1);
        assert!(store.get(&gone_elsewhere.id).unwrap().is_none());
    }

    #[test]
    fn merge_leaves_pending_deletions_for_the_queue() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();

        let pending = synced_meal("Being deleted", "2026-02-09");
        store.insert_local(&pending).unwrap();
        store.set_pending_deletion(&pending.id, true).unwrap();

        // Remote still lists the record; it must not be overwritten...
        let mut remote_version = pending.clone();
        remote_version.pending_deletion = false;
        let outcome = reconciler(&db)
            .merge_meals(vec![remote_version], date("2026-02-09"))
            .unwrap();
        assert_eq!(outcome.protected, 1);
        assert!(store.get(&pending.id).unwrap().unwrap().pending_deletion);

        // ...and when remote omits it, it must not be retired either.
        let outcome = reconciler(&db)
            .merge_meals(Vec::new(), date("2026-02-09"))
            .unwrap();
        assert_eq!(outcome.deleted, 0);
        assert!(store.get(&pending.id).unwrap().is_some());
    }

    #[test]
    fn merge_is_scoped_to_the_requested_day() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();

        let other_day = synced_meal("Yesterday's dinner", "2026-02-08");
        store.insert_local(&other_day).unwrap();

        reconciler(&db)
            .merge_meals(Vec::new(), date("2026-02-09"))
            .unwrap();

        assert!(store.get(&other_day.id).unwrap().is_some());
    }

    #[test]
    fn water_logs_merge_with_the_same_rules() {
        let db = Database::open_in_memory().unwrap();
        let store = db.water_store();

        let local_only = WaterLog::new(250, date("2026-02-09"));
        store.insert_local(&local_only).unwrap();

        let mut retired = WaterLog::new(500, date("2026-02-09"));
        retired.is_synced = true;
        store.insert_local(&retired).unwrap();

        let mut incoming = WaterLog::new(750, date("2026-02-09"));
        incoming.is_synced = true;

        let outcome = reconciler(&db)
            .merge_water(vec![incoming.clone()], date("2026-02-09"))
            .unwrap();

        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.deleted, 1);
        let ids: Vec<_> = store
            .list(date("2026-02-09"))
            .unwrap()
            .into_iter()
            .map(|log| log.id)
            .collect();
        assert!(ids.contains(&local_only.id));
        assert!(ids.contains(&incoming.id));
        assert!(!ids.contains(&retired.id));
    }
}
