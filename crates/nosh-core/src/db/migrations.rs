//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: Initial schema
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS meals (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            calories INTEGER NOT NULL,
            eaten_on TEXT NOT NULL,
            logged_at INTEGER NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0,
            pending_deletion INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_meals_eaten_on ON meals(eaten_on);
        CREATE INDEX IF NOT EXISTS idx_meals_pending ON meals(pending_deletion);
        CREATE TABLE IF NOT EXISTS water_logs (
            id TEXT PRIMARY KEY,
            milliliters INTEGER NOT NULL,
            logged_on TEXT NOT NULL,
            logged_at INTEGER NOT NULL,
            is_synced INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_water_logs_logged_on ON water_logs(logged_on);
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    )?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
