//! Database schema and version check
//!
//! A new store gets both tables and its version row in one transaction.
//! Existing stores must carry exactly [`DB_VERSION`]; there are no migrations.

use crate::config::DB_VERSION;
use crate::error::{AppError, Result};
use sqlx::sqlite::SqlitePool;
use std::path::Path;

const SCHEMA: &str = include_str!("schema.sql");

/// Create the tables of an empty store and record the schema version
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    tracing::info!("Creating note store schema (version {})", DB_VERSION);

    let mut tx = pool.begin().await?;

    for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query("INSERT INTO db_info (ver) VALUES (?)")
        .bind(DB_VERSION)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Note store schema created");
    Ok(())
}

/// Read the stored schema version.
///
/// A missing `db_info` table, an empty table or a file SQLite does not
/// recognise all read as "no version".
pub async fn read_version(pool: &SqlitePool) -> Result<Option<i64>> {
    match sqlx::query_scalar::<_, i64>("SELECT ver FROM db_info LIMIT 1")
        .fetch_optional(pool)
        .await
    {
        Ok(ver) => Ok(ver),
        Err(sqlx::Error::Database(e)) => {
            tracing::warn!("Could not read store version: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Fail with [`AppError::FormatMismatch`] unless the store is at [`DB_VERSION`]
pub async fn verify_version(pool: &SqlitePool, path: &Path) -> Result<()> {
    let found = read_version(pool).await?;
    tracing::info!("Note store version: {:?}", found);

    if found != Some(DB_VERSION) {
        return Err(AppError::FormatMismatch {
            path: path.to_path_buf(),
            expected: DB_VERSION,
            found,
        });
    }

    Ok(())
}

/// Largest stored entry id, if any
pub async fn max_entry_id(pool: &SqlitePool) -> Result<Option<i64>> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(entry_id) FROM entries")
        .fetch_one(pool)
        .await?;
    Ok(max)
}
