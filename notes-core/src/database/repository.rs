//! Repository layer for note persistence
//!
//! Translates between [`Note`] values and rows of `entries` and
//! `resource_entries`. Every mutation runs inside one transaction; a failed
//! statement drops the transaction, which rolls back everything before it.

use super::models::*;
use super::store::NoteStore;
use crate::error::{AppError, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::path::Path;

/// Counts of rows written by one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

impl BatchSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Repository for note rows
#[derive(Clone)]
pub struct NotesRepository {
    store: NoteStore,
}

impl NotesRepository {
    pub fn new(store: NoteStore) -> Self {
        Self { store }
    }

    /// Open (or create) the store at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(NoteStore::open(path, true).await?))
    }

    pub fn store(&self) -> &NoteStore {
        &self.store
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Insert a new note, or update it if it already has an id.
    ///
    /// The id is stamped on the note only after the commit succeeds.
    pub async fn add_note(&self, note: &mut Note) -> Result<()> {
        if note.is_saved() {
            return self.update_note(note).await;
        }

        let entry_id = self.store.ids().reserve();

        let written = async {
            let mut tx = self.store.begin().await?;
            insert_entry(&mut tx, entry_id, note).await?;
            tx.commit().await?;
            Ok::<_, AppError>(())
        }
        .await;

        if let Err(e) = written {
            self.store.ids().release(entry_id);
            tracing::error!("Failed to add note: {}", e);
            return Err(e);
        }

        note.assign_entry_id(entry_id);
        note.set_serialized(true);

        tracing::debug!("Added note: {}", entry_id);
        Ok(())
    }

    /// Write back a saved note that has local changes
    pub async fn update_note(&self, note: &mut Note) -> Result<()> {
        if !note.is_saved() {
            return Err(AppError::InvalidArgument(
                "cannot update a note that was never saved".to_string(),
            ));
        }
        if note.is_serialized() {
            return Err(AppError::InvalidArgument(format!(
                "note {} has no unsaved changes",
                note.entry_id()
            )));
        }

        let mut tx = self.store.begin().await?;

        if update_entry(&mut tx, note).await? == 0 {
            return Err(AppError::NoteNotFound(note.entry_id()));
        }

        tx.commit().await?;
        note.set_serialized(true);

        tracing::debug!("Updated note: {}", note.entry_id());
        Ok(())
    }

    pub async fn remove_note(&self, note: &Note) -> Result<()> {
        self.remove_note_by_id(note.entry_id()).await
    }

    /// Delete a note and its resource row
    pub async fn remove_note_by_id(&self, entry_id: i64) -> Result<()> {
        if entry_id < 0 {
            return Err(AppError::InvalidArgument(format!(
                "invalid entry id {}",
                entry_id
            )));
        }

        let mut tx = self.store.begin().await?;

        if delete_entry(&mut tx, entry_id).await? == 0 {
            return Err(AppError::NoteNotFound(entry_id));
        }

        tx.commit().await?;

        tracing::debug!("Removed note: {}", entry_id);
        Ok(())
    }

    /// Delete every note
    pub async fn remove_all(&self) -> Result<u64> {
        let mut tx = self.store.begin().await?;

        let removed = sqlx::query("DELETE FROM entries")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM resource_entries")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!("Removed all notes ({})", removed);
        Ok(removed)
    }

    /// Write every unserialized note in `notes` in a single transaction
    pub async fn serialize_batch(&self, notes: &mut [Note]) -> Result<BatchSummary> {
        self.write_batch(notes, &[]).await
    }

    /// Delete `removed` and write every unserialized note in `notes`,
    /// all in one transaction.
    ///
    /// Notes without an id get a fresh one; notes with an id are updated, or
    /// inserted when no row carries that id yet. On success every written
    /// note is marked serialized. On failure no note is touched.
    pub async fn write_batch(&self, notes: &mut [Note], removed: &[i64]) -> Result<BatchSummary> {
        let mut reserved: Vec<(usize, i64)> = Vec::new();

        let written = self.write_batch_tx(notes, removed, &mut reserved).await;

        let summary = match written {
            Ok(summary) => summary,
            Err(e) => {
                for &(_, entry_id) in reserved.iter().rev() {
                    self.store.ids().release(entry_id);
                }
                return Err(e);
            }
        };

        for &(index, entry_id) in &reserved {
            notes[index].assign_entry_id(entry_id);
        }
        for note in notes.iter_mut() {
            note.set_serialized(true);
        }

        if !summary.is_empty() {
            tracing::debug!(
                "Wrote note batch: {} inserted, {} updated, {} removed",
                summary.inserted,
                summary.updated,
                summary.removed
            );
        }
        Ok(summary)
    }

    async fn write_batch_tx(
        &self,
        notes: &[Note],
        removed: &[i64],
        reserved: &mut Vec<(usize, i64)>,
    ) -> Result<BatchSummary> {
        let mut summary = BatchSummary::default();
        let mut tx = self.store.begin().await?;

        for &entry_id in removed.iter().filter(|id| **id >= 0) {
            summary.removed += delete_entry(&mut tx, entry_id).await? as usize;
        }

        for (index, note) in notes.iter().enumerate() {
            if note.is_serialized() {
                continue;
            }

            if note.is_saved() {
                if update_entry(&mut tx, note).await? > 0 {
                    summary.updated += 1;
                } else {
                    insert_entry(&mut tx, note.entry_id(), note).await?;
                    summary.inserted += 1;
                }
            } else {
                let entry_id = self.store.ids().reserve();
                reserved.push((index, entry_id));
                insert_entry(&mut tx, entry_id, note).await?;
                summary.inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(summary)
    }

    /// List notes: marked notes first, then unmarked, each group ordered by
    /// `query.sort` in `query.order`, filtered by type and substring.
    pub async fn query_notes(&self, query: &NoteQuery) -> Result<Vec<Note>> {
        let sql = build_query_sql(query);
        let pattern = query.like_pattern();

        let mut notes = Vec::new();
        for marked in [1_i64, 0] {
            let mut q = sqlx::query(&sql).bind(marked);
            if let Some(pattern) = &pattern {
                q = q.bind(pattern);
            }
            if let TypeFilter::Only(note_type) = query.type_filter {
                q = q.bind(note_type.code());
            }

            for row in q.fetch_all(self.store.pool()).await? {
                notes.push(note_from_row(&row)?);
            }
        }

        Ok(notes)
    }
}

fn build_query_sql(query: &NoteQuery) -> String {
    let mut sql = String::from(
        r#"
        SELECT e.entry_id, e.type, e.timestamp, e.marked, e.title, e.text,
               (SELECT r.res_path FROM resource_entries r WHERE r.entry_id = e.entry_id LIMIT 1)
        FROM entries e
        WHERE e.marked = ?
        "#,
    );

    if !query.filter_text.is_empty() {
        sql.push_str(match query.filter_mode {
            FilterMode::ByTitle => " AND UPPER(e.title) LIKE UPPER(?) ESCAPE '\\'",
            FilterMode::ByText => " AND UPPER(e.text) LIKE UPPER(?) ESCAPE '\\'",
        });
    }

    if matches!(query.type_filter, TypeFilter::Only(_)) {
        sql.push_str(" AND e.type = ?");
    }

    let column = match query.sort {
        SortKey::Date => "e.timestamp",
        SortKey::Title => "e.title",
        SortKey::Type => "e.type",
    };
    let direction = match query.order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    sql.push_str(&format!(" ORDER BY {} {}, e.entry_id ASC", column, direction));

    sql
}

fn note_from_row(row: &SqliteRow) -> Result<Note> {
    let entry_id: i64 = row.try_get(0)?;
    let code: i64 = row.try_get(1)?;
    let note_type = NoteType::from_code(code).map_err(|_| {
        AppError::Generic(format!("entry {} has unknown type code {}", entry_id, code))
    })?;

    Ok(Note::from_row(
        entry_id,
        note_type,
        row.try_get::<Option<i64>, _>(2)?.unwrap_or_default(),
        row.try_get::<Option<i64>, _>(3)?.unwrap_or_default() != 0,
        row.try_get::<Option<String>, _>(4)?.unwrap_or_default(),
        row.try_get::<Option<String>, _>(5)?.unwrap_or_default(),
        row.try_get::<Option<String>, _>(6)?.unwrap_or_default(),
    ))
}

async fn insert_entry(conn: &mut SqliteConnection, entry_id: i64, note: &Note) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO entries (entry_id, type, timestamp, marked, title, text)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry_id)
    .bind(note.note_type().code())
    .bind(note.mod_time())
    .bind(i64::from(note.marked()))
    .bind(note.title())
    .bind(note.text())
    .execute(&mut *conn)
    .await?;

    if note.note_type().has_resource() {
        sqlx::query("INSERT INTO resource_entries (entry_id, res_path) VALUES (?, ?)")
            .bind(entry_id)
            .bind(note.resource_path())
            .execute(&mut *conn)
            .await?;
    }

    Ok(())
}

/// Returns the number of `entries` rows updated (0 when the id is unknown)
async fn update_entry(conn: &mut SqliteConnection, note: &Note) -> Result<u64> {
    let updated = sqlx::query(
        r#"
        UPDATE entries SET timestamp = ?, marked = ?, title = ?, text = ?
        WHERE entry_id = ?
        "#,
    )
    .bind(note.mod_time())
    .bind(i64::from(note.marked()))
    .bind(note.title())
    .bind(note.text())
    .bind(note.entry_id())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if updated > 0 && note.note_type().has_resource() {
        let res_rows = sqlx::query("UPDATE resource_entries SET res_path = ? WHERE entry_id = ?")
            .bind(note.resource_path())
            .bind(note.entry_id())
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if res_rows == 0 {
            sqlx::query("INSERT INTO resource_entries (entry_id, res_path) VALUES (?, ?)")
                .bind(note.entry_id())
                .bind(note.resource_path())
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(updated)
}

/// Returns the number of `entries` rows deleted
async fn delete_entry(conn: &mut SqliteConnection, entry_id: i64) -> Result<u64> {
    let deleted = sqlx::query("DELETE FROM entries WHERE entry_id = ?")
        .bind(entry_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

    sqlx::query("DELETE FROM resource_entries WHERE entry_id = ?")
        .bind(entry_id)
        .execute(&mut *conn)
        .await?;

    Ok(deleted)
}
