//! Note store adapter
//!
//! Owns the on-disk SQLite file holding the notes. Opening a missing file
//! creates the schema; opening an existing one checks its version and
//! recovers the next entry id from `MAX(entry_id)`.
//!
//! Parameterized statements are built with `sqlx::query(sql).bind(..)`
//! against [`NoteStore::pool`] or a transaction from [`NoteStore::begin`].
//! A transaction dropped without `commit()` is rolled back.

use super::connect_options;
use super::schema::{create_schema, max_entry_id, verify_version};
use crate::error::{AppError, Result};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Hands out entry ids in increasing order.
#[derive(Debug)]
pub struct EntryIdAllocator {
    next: AtomicI64,
}

impl EntryIdAllocator {
    pub fn new(next: i64) -> Self {
        Self {
            next: AtomicI64::new(next),
        }
    }

    /// Take the next unused id
    pub fn reserve(&self) -> i64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Give back `id` if it is still the most recent reservation.
    /// Returns false when another id was reserved in the meantime.
    pub fn release(&self, id: i64) -> bool {
        self.next
            .compare_exchange(id + 1, id, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// The id the next reservation will return
    pub fn peek(&self) -> i64 {
        self.next.load(Ordering::SeqCst)
    }
}

/// Handle to one note store file
#[derive(Clone)]
pub struct NoteStore {
    pool: SqlitePool,
    path: PathBuf,
    ids: Arc<EntryIdAllocator>,
}

impl NoteStore {
    /// Open the store at `path`.
    ///
    /// A missing file is created with a fresh schema when `create_if_missing`
    /// is set and reported as [`AppError::StoreUnavailable`] otherwise.
    pub async fn open(path: impl AsRef<Path>, create_if_missing: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| AppError::store_unavailable(&path, e))?;

        tracing::info!("Opening note store at {:?} (exists: {})", path, exists);

        if !exists && create_if_missing {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| AppError::store_unavailable(&path, e))?;
            }
        }

        // One connection: transactions on this file never overlap.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(&path, create_if_missing && !exists))
            .await
            .map_err(|e| AppError::store_unavailable(&path, e))?;

        let prepared = async {
            if exists {
                verify_version(&pool, &path).await?;
            } else {
                create_schema(&pool).await?;
            }
            // Only a verified note store is switched to WAL.
            sqlx::query("PRAGMA journal_mode = WAL")
                .execute(&pool)
                .await?;
            max_entry_id(&pool).await
        }
        .await;

        let next_id = match prepared {
            Ok(max) => max.map_or(0, |m| m + 1),
            Err(e) => {
                pool.close().await;
                if !exists {
                    // Leave no half-initialised file behind.
                    if let Err(rm) = tokio::fs::remove_file(&path).await {
                        tracing::warn!("Failed to remove partial store {:?}: {}", path, rm);
                    }
                }
                return Err(e);
            }
        };

        tracing::info!("Note store ready at {:?}, next entry id {}", path, next_id);

        Ok(Self {
            pool,
            path,
            ids: Arc::new(EntryIdAllocator::new(next_id)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn ids(&self) -> &EntryIdAllocator {
        &self.ids
    }

    /// Run a statement without parameters, returning the affected row count
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let done = sqlx::query(sql).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Close the underlying connection. Later calls fail with a database error.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Note store closed: {:?}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DB_VERSION;
    use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
    use tempfile::TempDir;

    #[test]
    fn test_allocator_reserve_and_release() {
        let ids = EntryIdAllocator::new(5);
        assert_eq!(ids.reserve(), 5);
        assert_eq!(ids.reserve(), 6);

        assert!(ids.release(6));
        assert_eq!(ids.peek(), 6);

        let a = ids.reserve();
        let _b = ids.reserve();
        assert!(!ids.release(a), "older reservation must not be reused");
        assert_eq!(ids.peek(), 8);
    }

    #[tokio::test]
    async fn test_open_creates_schema() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("notes.bin");

        let store = NoteStore::open(&path, true).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.ids().peek(), 0);
        let ver: i64 = sqlx::query_scalar("SELECT ver FROM db_info")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(ver, DB_VERSION);
    }

    #[tokio::test]
    async fn test_open_missing_without_create_fails() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("absent.bin");

        let err = NoteStore::open(&path, false).await.err().unwrap();

        assert!(matches!(err, AppError::StoreUnavailable { .. }));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_reopen_recovers_next_id() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.bin");

        let store = NoteStore::open(&path, true).await.unwrap();
        store
            .execute("INSERT INTO entries (entry_id, type, timestamp, marked, title, text) VALUES (41, 1, 0, 0, 'a', 'b')")
            .await
            .unwrap();
        store.close().await;

        let reopened = NoteStore::open(&path, false).await.unwrap();
        assert_eq!(reopened.ids().peek(), 42);
    }

    #[tokio::test]
    async fn test_open_rejects_other_version() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.bin");

        let store = NoteStore::open(&path, true).await.unwrap();
        store.execute("UPDATE db_info SET ver = 1").await.unwrap();
        store.close().await;

        let err = NoteStore::open(&path, true).await.err().unwrap();
        assert!(matches!(err, AppError::FormatMismatch { found: Some(1), .. }));
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_store_unavailable() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("plain-file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let err = NoteStore::open(blocker.join("notes.bin"), true)
            .await
            .err()
            .unwrap();

        assert!(
            matches!(err, AppError::StoreUnavailable { .. }),
            "unexpected error: {}",
            err
        );
    }

    #[tokio::test]
    async fn test_rejected_file_is_left_untouched() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("old.bin");

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE db_info (ver INTEGER)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO db_info (ver) VALUES (1)")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
        let before = std::fs::read(&path).unwrap();

        let err = NoteStore::open(&path, true).await.err().unwrap();
        assert!(matches!(err, AppError::FormatMismatch { .. }));

        // Header bytes 18 and 19 hold the journal mode (1 = rollback, 2 = WAL)
        let after = std::fs::read(&path).unwrap();
        assert_eq!(&after[18..20], &[1, 1]);
        assert_eq!(before, after);
    }
}
