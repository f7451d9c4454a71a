//! Versioned schema steps for the stockbot database.
//!
//! # Invariants
//! - Versions start at 1 and increase by exactly one per step.
//! - Each step commits together with its `PRAGMA user_version` bump, so an
//!   interrupted upgrade resumes from the last finished step.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

struct SchemaStep {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const SCHEMA_STEPS: &[SchemaStep] = &[
    SchemaStep {
        version: 1,
        name: "inventory",
        sql: include_str!("0001_inventory.sql"),
    },
    SchemaStep {
        version: 2,
        name: "accounts",
        sql: include_str!("0002_accounts.sql"),
    },
    SchemaStep {
        version: 3,
        name: "item_sort_class",
        sql: include_str!("0003_item_sort_class.sql"),
    },
];

/// Highest schema version this build can open.
pub fn latest_version() -> u32 {
    SCHEMA_STEPS.len() as u32
}

/// Brings `conn` up to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let from = schema_version(conn)?;
    let latest = latest_version();
    if from > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: from,
            latest_supported: latest,
        });
    }

    for step in SCHEMA_STEPS.iter().filter(|step| step.version > from) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", step.version)?;
        tx.commit()?;
        info!(
            "event=db_migrate module=db status=ok step={} version={}",
            step.name, step.version
        );
    }
    Ok(())
}

fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get::<_, u32>(0))?)
}
