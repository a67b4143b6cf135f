//! Record store implementations over `SQLite`.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::models::{Meal, MealId, WaterLog, WaterLogId};

use super::connection::lock_connection;

/// Trait for meal storage operations.
///
/// `list_visible` is the user-facing view (pending deletions hidden);
/// `list_scope` is the reconciliation view (everything, flags included).
/// `apply_merge` commits a batch of upserts and deletes in one transaction.
pub trait MealStore: Send + Sync {
    /// Insert a locally created meal (not yet synced)
    fn insert_local(&self, meal: &Meal) -> Result<()>;

    /// Get a meal by ID, pending-deletion records included
    fn get(&self, id: &MealId) -> Result<Option<Meal>>;

    /// List meals for a day, excluding pending deletions
    fn list_visible(&self, date: NaiveDate) -> Result<Vec<Meal>>;

    /// List every meal for a day, including pending deletions
    fn list_scope(&self, date: NaiveDate) -> Result<Vec<Meal>>;

    /// Overwrite an existing meal's stored fields
    fn update(&self, meal: &Meal) -> Result<()>;

    /// Flip a meal to synced after the server acknowledged it
    fn mark_synced(&self, id: &MealId) -> Result<()>;

    /// Set or clear the pending-deletion flag
    fn set_pending_deletion(&self, id: &MealId, pending: bool) -> Result<()>;

    /// Physically remove a meal
    fn delete(&self, id: &MealId) -> Result<()>;

    /// Apply a reconciliation batch atomically
    fn apply_merge(&self, upserts: &[Meal], deletes: &[MealId]) -> Result<()>;
}

/// Trait for water log storage operations
pub trait WaterStore: Send + Sync {
    /// Insert a locally created water log (not yet synced)
    fn insert_local(&self, log: &WaterLog) -> Result<()>;

    /// List water logs for a day
    fn list(&self, date: NaiveDate) -> Result<Vec<WaterLog>>;

    /// Flip a water log to synced after the server acknowledged it
    fn mark_synced(&self, id: &WaterLogId) -> Result<()>;

    /// Apply a reconciliation batch atomically
    fn apply_merge(&self, upserts: &[WaterLog], deletes: &[WaterLogId]) -> Result<()>;
}

/// `SQLite` implementation of `MealStore`
#[derive(Clone)]
pub struct SqliteMealStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMealStore {
    pub(super) const fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// Parse a meal from a database row
    fn parse_meal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: parse_text_column(row, 0)?,
            name: row.get(1)?,
            calories: row.get(2)?,
            eaten_on: parse_text_column(row, 3)?,
            logged_at: row.get(4)?,
            is_synced: row.get::<_, i32>(5)? != 0,
            pending_deletion: row.get::<_, i32>(6)? != 0,
        })
    }

    fn list_where(&self, date: NaiveDate, visible_only: bool) -> Result<Vec<Meal>> {
        let conn = lock_connection(&self.conn)?;
        let filter = if visible_only {
            "eaten_on = ? AND pending_deletion = 0"
        } else {
            "eaten_on = ?"
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT id, name, calories, eaten_on, logged_at, is_synced, pending_deletion
             FROM meals
             WHERE {filter}
             ORDER BY logged_at ASC"
        ))?;

        let meals = stmt
            .query_map(params![date.to_string()], Self::parse_meal)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(meals)
    }

    fn upsert(conn: &Connection, meal: &Meal) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO meals (id, name, calories, eaten_on, logged_at, is_synced, pending_deletion)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 calories = excluded.calories,
                 eaten_on = excluded.eaten_on,
                 logged_at = excluded.logged_at,
                 is_synced = excluded.is_synced,
                 pending_deletion = excluded.pending_deletion",
            params![
                meal.id.as_str(),
                meal.name,
                meal.calories,
                meal.eaten_on.to_string(),
                meal.logged_at,
                i32::from(meal.is_synced),
                i32::from(meal.pending_deletion)
            ],
        )
    }
}

impl MealStore for SqliteMealStore {
    fn insert_local(&self, meal: &Meal) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        conn.execute(
            "INSERT INTO meals (id, name, calories, eaten_on, logged_at, is_synced, pending_deletion)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                meal.id.as_str(),
                meal.name,
                meal.calories,
                meal.eaten_on.to_string(),
                meal.logged_at,
                i32::from(meal.is_synced),
                i32::from(meal.pending_deletion)
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &MealId) -> Result<Option<Meal>> {
        let conn = lock_connection(&self.conn)?;
        let result = conn.query_row(
            "SELECT id, name, calories, eaten_on, logged_at, is_synced, pending_deletion
             FROM meals WHERE id = ?",
            params![id.as_str()],
            Self::parse_meal,
        );

        match result {
            Ok(meal) => Ok(Some(meal)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_visible(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        self.list_where(date, true)
    }

    fn list_scope(&self, date: NaiveDate) -> Result<Vec<Meal>> {
        self.list_where(date, false)
    }

    fn update(&self, meal: &Meal) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        let rows = conn.execute(
            "UPDATE meals SET name = ?, calories = ?, eaten_on = ?, logged_at = ?,
                    is_synced = ?, pending_deletion = ?
             WHERE id = ?",
            params![
                meal.name,
                meal.calories,
                meal.eaten_on.to_string(),
                meal.logged_at,
                i32::from(meal.is_synced),
                i32::from(meal.pending_deletion),
                meal.id.as_str()
            ],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(meal.id.to_string()));
        }
        Ok(())
    }

    fn mark_synced(&self, id: &MealId) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        let rows = conn.execute(
            "UPDATE meals SET is_synced = 1 WHERE id = ?",
            params![id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_pending_deletion(&self, id: &MealId, pending: bool) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        let rows = conn.execute(
            "UPDATE meals SET pending_deletion = ? WHERE id = ?",
            params![i32::from(pending), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete(&self, id: &MealId) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        conn.execute("DELETE FROM meals WHERE id = ?", params![id.as_str()])?;
        Ok(())
    }

    fn apply_merge(&self, upserts: &[Meal], deletes: &[MealId]) -> Result<()> {
        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction()?;
        for meal in upserts {
            Self::upsert(&tx, meal)?;
        }
        for id in deletes {
            tx.execute("DELETE FROM meals WHERE id = ?", params![id.as_str()])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// `SQLite` implementation of `WaterStore`
#[derive(Clone)]
pub struct SqliteWaterStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWaterStore {
    pub(super) const fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn parse_log(row: &rusqlite::Row<'_>) -> rusqlite::Result<WaterLog> {
        Ok(WaterLog {
            id: parse_text_column(row, 0)?,
            milliliters: row.get(1)?,
            logged_on: parse_text_column(row, 2)?,
            logged_at: row.get(3)?,
            is_synced: row.get::<_, i32>(4)? != 0,
        })
    }

    fn upsert(conn: &Connection, log: &WaterLog) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO water_logs (id, milliliters, logged_on, logged_at, is_synced)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 milliliters = excluded.milliliters,
                 logged_on = excluded.logged_on,
                 logged_at = excluded.logged_at,
                 is_synced = excluded.is_synced",
            params![
                log.id.as_str(),
                log.milliliters,
                log.logged_on.to_string(),
                log.logged_at,
                i32::from(log.is_synced)
            ],
        )
    }
}

impl WaterStore for SqliteWaterStore {
    fn insert_local(&self, log: &WaterLog) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        conn.execute(
            "INSERT INTO water_logs (id, milliliters, logged_on, logged_at, is_synced)
             VALUES (?, ?, ?, ?, ?)",
            params![
                log.id.as_str(),
                log.milliliters,
                log.logged_on.to_string(),
                log.logged_at,
                i32::from(log.is_synced)
            ],
        )?;
        Ok(())
    }

    fn list(&self, date: NaiveDate) -> Result<Vec<WaterLog>> {
        let conn = lock_connection(&self.conn)?;
        let mut stmt = conn.prepare(
            "SELECT id, milliliters, logged_on, logged_at, is_synced
             FROM water_logs
             WHERE logged_on = ?
             ORDER BY logged_at ASC",
        )?;

        let logs = stmt
            .query_map(params![date.to_string()], Self::parse_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(logs)
    }

    fn mark_synced(&self, id: &WaterLogId) -> Result<()> {
        let conn = lock_connection(&self.conn)?;
        let rows = conn.execute(
            "UPDATE water_logs SET is_synced = 1 WHERE id = ?",
            params![id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn apply_merge(&self, upserts: &[WaterLog], deletes: &[WaterLogId]) -> Result<()> {
        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction()?;
        for log in upserts {
            Self::upsert(&tx, log)?;
        }
        for id in deletes {
            tx.execute("DELETE FROM water_logs WHERE id = ?", params![id.as_str()])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Parse a TEXT column into any `FromStr` value with a typed conversion error.
fn parse_text_column<V>(row: &rusqlite::Row<'_>, index: usize) -> rusqlite::Result<V>
where
    V: std::str::FromStr,
    V::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(index)?;
    raw.parse().map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(error))
    })
}
