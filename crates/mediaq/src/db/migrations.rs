//! Schema of the lead store, versioned through a `_migrations` table.

use rusqlite::Connection;

use super::error::DatabaseError;

/// A single migration definition.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_leads_table",
        sql: "CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY NOT NULL,
                attachments TEXT NOT NULL DEFAULT '[]' CHECK (json_valid(attachments)),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
    },
    Migration {
        version: 2,
        description: "index_leads_updated_at",
        sql: "CREATE INDEX IF NOT EXISTS idx_leads_updated_at ON leads (updated_at);",
    },
];

/// Applies every migration newer than the recorded version.
///
/// The worker and the web tier may open the same file at once, so each
/// migration runs in its own `BEGIN IMMEDIATE` and re-checks the version
/// after taking the write lock.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version(conn)? {
            continue;
        }

        conn.execute_batch("BEGIN IMMEDIATE")?;
        match apply(conn, migration) {
            Ok(applied) => {
                conn.execute_batch("COMMIT")?;
                if applied {
                    log::info!("Applied migration v{}: {}", migration.version, migration.description);
                }
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
    }

    Ok(())
}

fn current_version(conn: &Connection) -> Result<u32, DatabaseError> {
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?)
}

/// Returns false when another connection applied it first.
fn apply(conn: &Connection, migration: &Migration) -> Result<bool, DatabaseError> {
    if migration.version <= current_version(conn)? {
        return Ok(false);
    }

    conn.execute_batch(migration.sql)
        .map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
    conn.execute(
        "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
        rusqlite::params![migration.version, migration.description],
    )?;
    Ok(true)
}
