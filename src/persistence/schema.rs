//! `SQLite` schema bootstrap logic.
//!
//! Every table uses `CREATE TABLE IF NOT EXISTS`, so this runs on every
//! startup from either binary.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS endpoint (
    ip              TEXT NOT NULL,
    port            INTEGER NOT NULL,
    first_seen      TEXT NOT NULL,
    last_seen       TEXT NOT NULL,
    uname           TEXT,
    user            TEXT,
    nickname        TEXT,
    PRIMARY KEY (ip, port)
);

CREATE TABLE IF NOT EXISTS priority_task (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    command         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
