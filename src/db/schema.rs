//! Versioned schema bootstrap. Each embedded script runs once, in order, and
//! is recorded in `schema_migrations`.

use anyhow::{Context, Result};
use rusqlite::Connection;

struct Migration {
    version: &'static str,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: "001",
    name: "campaign_aggregates",
    sql: include_str!("migrations/001_initial.sql"),
}];

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .context("Failed to create schema_migrations table")?;

    let applied = get_applied_migrations(conn)?;

    for migration in MIGRATIONS {
        if !applied.iter().any(|v| v == migration.version) {
            apply_migration(conn, migration)?;
        }
    }

    Ok(())
}

fn get_applied_migrations(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(versions)
}

fn mark_migration_applied(conn: &Connection, version: &str, name: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)",
        (version, name, &now),
    )?;
    Ok(())
}

/// Apply one migration and record it, both in a single transaction so a
/// failing script leaves neither tables nor a version row behind.
fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    tracing::info!(
        version = migration.version,
        name = migration.name,
        "applying migration"
    );

    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql).with_context(|| {
        format!(
            "Failed to apply migration {}: {}",
            migration.version, migration.name
        )
    })?;
    mark_migration_applied(&tx, migration.version, migration.name)?;
    tx.commit()?;

    tracing::info!(version = migration.version, "migration applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::registry::Registry;

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")
            .unwrap();
        stmt.query_map([table], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrations_run_on_fresh_db() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='locations'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let versions = get_applied_migrations(&conn).unwrap();
        assert_eq!(versions, vec!["001"]);
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions = get_applied_migrations(&conn).unwrap();
        assert_eq!(versions, vec!["001"]);
    }

    #[test]
    fn test_conflicting_table_fails_without_recording_version() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE locations (id TEXT PRIMARY KEY, name TEXT NOT NULL);")
            .unwrap();

        let err = run_migrations(&conn).unwrap_err();
        assert!(err.to_string().contains("001"));

        assert!(get_applied_migrations(&conn).unwrap().is_empty());
        let factions: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='factions'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(factions, 0);
    }

    #[test]
    fn test_tables_match_registry() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let registry = Registry::standard().unwrap();

        for schema in registry.schemas() {
            let root = table_columns(&conn, schema.table);
            assert!(root.contains(&"id".to_string()), "{} has no id", schema.table);
            for column in schema.columns {
                assert!(
                    root.iter().any(|c| c == column.name),
                    "{}.{} missing",
                    schema.table,
                    column.name
                );
            }

            for collection in schema.collections {
                let actual = table_columns(&conn, collection.table);
                for column in schema.child_columns(collection) {
                    assert!(
                        actual.iter().any(|c| c == column),
                        "{}.{} missing",
                        collection.table,
                        column
                    );
                }
            }
        }
    }
}
