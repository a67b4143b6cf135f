//! Database connection management

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::{Error, Result};

use super::migrations;
use super::repository::{SqliteMealStore, SqliteWaterStore};

/// Handle to the local `SQLite` store.
///
/// The connection sits behind one lock; every store handed out clones the
/// same handle, so all writers are serialized and a multi-statement merge is
/// invisible to readers until its transaction commits.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Meal store view over this database.
    #[must_use]
    pub fn meal_store(&self) -> SqliteMealStore {
        SqliteMealStore::new(self.conn.clone())
    }

    /// Water log store view over this database.
    #[must_use]
    pub fn water_store(&self) -> SqliteWaterStore {
        SqliteWaterStore::new(self.conn.clone())
    }
}

/// Configure `SQLite` for safe concurrent use.
fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL").ok();
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

pub(super) fn lock_connection(
    conn: &Arc<Mutex<Connection>>,
) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|_| Error::Database("connection lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MealStore;
    use tempfile::tempdir;

    #[test]
    fn open_in_memory_runs_migrations() {
        let db = Database::open_in_memory().unwrap();
        let store = db.meal_store();
        assert!(store.list_scope("2026-02-09".parse().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nosh.db");

        {
            let db = Database::open(&path).unwrap();
            let store = db.meal_store();
            store
                .insert_local(&crate::models::Meal::new(
                    "Oatmeal",
                    350,
                    "2026-02-09".parse().unwrap(),
                ))
                .unwrap();
        }

        let db = Database::open(&path).unwrap();
        let meals = db
            .meal_store()
            .list_scope("2026-02-09".parse().unwrap())
            .unwrap();
        assert_eq!(meals.len(), 1);
        assert_eq!(meals[0].name, "Oatmeal");
    }
}
