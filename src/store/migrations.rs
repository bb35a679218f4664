//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! A database created before version tracking (a `sessions` table but no
//! `_migrations` rows) is seeded at V1 after adding any columns it lacks;
//! a column that cannot be added fails the migration.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "sessions",
        sql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                platform TEXT NOT NULL,
                name TEXT,
                email TEXT,
                phone TEXT,
                target_country TEXT,
                preferred_intake TEXT,
                study_level TEXT,
                gpa_grades TEXT,
                study_field TEXT,
                progress_state TEXT NOT NULL DEFAULT 'conversation_active',
                exchange_count INTEGER NOT NULL DEFAULT 0,
                completed_steps TEXT NOT NULL DEFAULT '[]',
                next_actions TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_platform ON sessions(platform);
            CREATE INDEX IF NOT EXISTS idx_sessions_last_updated ON sessions(last_updated);
        "#,
    },
    Migration {
        version: 2,
        name: "leads",
        sql: r#"
            CREATE TABLE IF NOT EXISTS leads (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL UNIQUE,
                platform TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                phone TEXT NOT NULL,
                target_country TEXT NOT NULL,
                preferred_intake TEXT,
                study_level TEXT,
                gpa_grades TEXT,
                study_field TEXT,
                captured_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_leads_captured_at ON leads(captured_at);
        "#,
    },
];

/// Every V1 `sessions` column besides the key, with the definition used to
/// add it to a pre-versioning table that lacks it.
const LEGACY_SESSION_COLUMNS: &[(&str, &str)] = &[
    ("platform", "TEXT NOT NULL DEFAULT 'telegram'"),
    ("name", "TEXT"),
    ("email", "TEXT"),
    ("phone", "TEXT"),
    ("target_country", "TEXT"),
    ("preferred_intake", "TEXT"),
    ("study_level", "TEXT"),
    ("gpa_grades", "TEXT"),
    ("study_field", "TEXT"),
    ("progress_state", "TEXT NOT NULL DEFAULT 'conversation_active'"),
    ("exchange_count", "INTEGER NOT NULL DEFAULT 0"),
    ("completed_steps", "TEXT NOT NULL DEFAULT '[]'"),
    ("next_actions", "TEXT NOT NULL DEFAULT '[]'"),
    ("created_at", "TEXT NOT NULL DEFAULT ''"),
    ("last_updated", "TEXT NOT NULL DEFAULT ''"),
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let mut current_version = get_current_version(conn).await?;

    if current_version == 0 && legacy_sessions_exist(conn).await? {
        let existing = session_columns(conn).await?;
        for (column, definition) in LEGACY_SESSION_COLUMNS {
            if existing.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                continue;
            }
            conn.execute(
                &format!("ALTER TABLE sessions ADD COLUMN {column} {definition}"),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::Migration(format!("Failed to add sessions.{column}: {e}"))
            })?;
        }
        seed_version(conn, 1, "sessions").await?;
        current_version = 1;
        tracing::info!("Unversioned sessions table detected, seeded migration V1");
    }

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => row.get::<i64>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
        }),
        None => Ok(0),
    }
}

async fn legacy_sessions_exist(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='sessions'",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check legacy tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read legacy check: {e}")))?;

    Ok(row.map(|r| r.get::<i64>(0).unwrap_or(0) > 0).unwrap_or(false))
}

/// Column names of the existing `sessions` table.
async fn session_columns(conn: &Connection) -> Result<Vec<String>, DatabaseError> {
    let mut rows = conn
        .query("SELECT name FROM pragma_table_info('sessions')", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to list sessions columns: {e}")))?;

    let mut columns = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read sessions columns: {e}")))?
    {
        let name = row.get::<String>(0).map_err(|e| {
            DatabaseError::Migration(format!("Failed to parse sessions column: {e}"))
        })?;
        columns.push(name);
    }
    Ok(columns)
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_conn() -> Connection {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, table: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                libsql::params![table],
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        row.get::<i64>(0).unwrap() == 1
    }

    #[tokio::test]
    async fn migrations_create_all_tables() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        for table in ["sessions", "leads", "_migrations"] {
            assert!(table_exists(&conn, table).await, "Table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();
        run_migrations(&conn).await.unwrap();

        let version = get_current_version(&conn).await.unwrap();
        assert_eq!(version, 2);
    }

    #[tokio::test]
    async fn unversioned_sessions_table_is_upgraded() {
        let conn = test_conn().await;

        conn.execute_batch(
            "CREATE TABLE sessions (
                session_id TEXT PRIMARY KEY,
                name TEXT,
                email TEXT,
                phone TEXT,
                target_country TEXT,
                preferred_intake TEXT,
                study_level TEXT,
                gpa_grades TEXT,
                progress_state TEXT,
                exchange_count INTEGER,
                created_at TEXT,
                last_updated TEXT
            );
            INSERT INTO sessions (session_id, email, created_at, last_updated)
                VALUES ('telegram_9', 'old@mail.com', '2025-01-01 10:00:00', '2025-01-01 10:00:00');",
        )
        .await
        .unwrap();

        run_migrations(&conn).await.unwrap();
        assert_eq!(get_current_version(&conn).await.unwrap(), 2);
        assert!(table_exists(&conn, "leads").await);

        let mut rows = conn
            .query(
                "SELECT platform, next_actions FROM sessions WHERE session_id = 'telegram_9'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "telegram");
        assert_eq!(row.get::<String>(1).unwrap(), "[]");
    }

    #[tokio::test]
    async fn bare_unversioned_sessions_table_gets_every_column() {
        let conn = test_conn().await;

        conn.execute_batch(
            "CREATE TABLE sessions (session_id TEXT PRIMARY KEY, email TEXT);
            INSERT INTO sessions (session_id, email) VALUES ('telegram_4', 'bare@mail.com');",
        )
        .await
        .unwrap();

        run_migrations(&conn).await.unwrap();
        assert_eq!(get_current_version(&conn).await.unwrap(), 2);

        let columns = session_columns(&conn).await.unwrap();
        for (column, _) in LEGACY_SESSION_COLUMNS {
            assert!(columns.iter().any(|c| c == column), "missing sessions.{column}");
        }

        let mut rows = conn
            .query(
                "SELECT progress_state, exchange_count FROM sessions WHERE session_id = 'telegram_4'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "conversation_active");
        assert_eq!(row.get::<i64>(1).unwrap(), 0);
    }

    #[tokio::test]
    async fn existing_columns_match_case_insensitively() {
        let conn = test_conn().await;

        conn.execute_batch(
            "CREATE TABLE sessions (session_id TEXT PRIMARY KEY, Platform TEXT, EMAIL TEXT);",
        )
        .await
        .unwrap();

        run_migrations(&conn).await.unwrap();
        let columns = session_columns(&conn).await.unwrap();
        assert_eq!(
            columns.iter().filter(|c| c.eq_ignore_ascii_case("platform")).count(),
            1
        );
        assert_eq!(columns.len(), LEGACY_SESSION_COLUMNS.len() + 1);
    }

    #[tokio::test]
    async fn version_tracking() {
        let conn = test_conn().await;
        run_migrations(&conn).await.unwrap();

        let mut rows = conn
            .query("SELECT version, name FROM _migrations ORDER BY version", ())
            .await
            .unwrap();
        let row1 = rows.next().await.unwrap().unwrap();
        assert_eq!(row1.get::<i64>(0).unwrap(), 1);
        assert_eq!(row1.get::<String>(1).unwrap(), "sessions");

        let row2 = rows.next().await.unwrap().unwrap();
        assert_eq!(row2.get::<i64>(0).unwrap(), 2);
        assert_eq!(row2.get::<String>(1).unwrap(), "leads");
    }
}
