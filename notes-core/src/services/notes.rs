//! Notes service
//!
//! High-level operations used by the note editing screens.
//! Builds notes from user input and submits them to the note cache.

use crate::config::{TITLE_ELLIPSIS, TITLE_PREVIEW_CHARS};
use crate::database::{Note, NoteQuery, NoteType};
use crate::error::{AppError, Result};
use crate::services::notes_cache::{FlushOutcome, NotesCache};
use std::path::Path;
use std::time::Duration;

/// Title shown for a note: the given title, or a preview of the body
pub fn derive_title(title: &str, text: &str) -> String {
    if !title.trim().is_empty() {
        return title.to_string();
    }

    let mut chars = text.chars();
    let preview: String = chars.by_ref().take(TITLE_PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}{}", preview, TITLE_ELLIPSIS)
    } else {
        preview
    }
}

/// Service for managing notes
pub struct NotesService {
    cache: NotesCache,
}

impl NotesService {
    pub fn new(cache: NotesCache) -> Self {
        Self { cache }
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(NotesCache::open(path).await?))
    }

    pub async fn open_with_interval(path: impl AsRef<Path>, interval: Duration) -> Result<Self> {
        Ok(Self::new(NotesCache::open_with_interval(path, interval).await?))
    }

    pub fn cache(&self) -> &NotesCache {
        &self.cache
    }

    /// Path of the store backing this service
    pub fn path(&self) -> &Path {
        self.cache.path()
    }

    /// Create a text note stamped with the current time
    pub fn create_text_note(&self, title: &str, text: &str, marked: bool) -> Result<Note> {
        if text.is_empty() {
            return Err(AppError::InvalidArgument(
                "a text note needs some text".to_string(),
            ));
        }

        let mut note = Note::new_text(derive_title(title, text), text);
        note.set_marked(marked);
        note.touch();

        let entry_id = self.cache.add_note(note)?;
        tracing::info!("Created text note: {}", entry_id);

        self.cache.get_note(entry_id)
    }

    /// Create a photo or audio note referring to a file on disk
    pub fn create_resource_note(
        &self,
        note_type: NoteType,
        title: &str,
        resource_path: &str,
        marked: bool,
    ) -> Result<Note> {
        if resource_path.is_empty() {
            return Err(AppError::InvalidArgument(
                "a resource note needs a file path".to_string(),
            ));
        }

        let mut note = Note::resource(note_type, title, resource_path)?;
        note.set_marked(marked);
        note.touch();

        let entry_id = self.cache.add_note(note)?;
        tracing::info!("Created {:?} note: {}", note_type, entry_id);

        self.cache.get_note(entry_id)
    }

    /// Apply edits from the note editor and re-stamp the modification time
    pub fn edit_note(&self, entry_id: i64, title: &str, text: &str, marked: bool) -> Result<Note> {
        let mut note = self.cache.get_note(entry_id)?;

        if note.note_type() == NoteType::Text && text.is_empty() {
            return Err(AppError::InvalidArgument(
                "a text note needs some text".to_string(),
            ));
        }

        note.set_title(derive_title(title, text));
        note.set_text(text);
        note.set_marked(marked);
        note.touch();

        self.cache.update_note(note.clone())?;
        tracing::debug!("Edited note: {}", entry_id);

        Ok(note)
    }

    /// Pin or unpin a note without touching its modification time
    pub fn set_marked(&self, entry_id: i64, marked: bool) -> Result<Note> {
        let mut note = self.cache.get_note(entry_id)?;
        if note.marked() == marked {
            return Ok(note);
        }

        note.set_marked(marked);
        self.cache.update_note(note.clone())?;
        Ok(note)
    }

    pub fn delete_note(&self, entry_id: i64) -> Result<()> {
        self.cache.remove_note_by_id(entry_id)?;
        tracing::info!("Deleted note: {}", entry_id);
        Ok(())
    }

    pub fn list_notes(&self, query: &NoteQuery) -> Vec<Note> {
        self.cache.query_notes(query)
    }

    pub fn note_at(&self, index: usize) -> Result<Note> {
        self.cache.note_at(index)
    }

    /// Write pending changes to the store now
    pub async fn flush(&self) -> Result<FlushOutcome> {
        self.cache.flush().await
    }

    /// Write pending changes and release the store
    pub async fn close(self) -> Result<()> {
        self.cache.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{FilterMode, SortKey, SortOrder};
    use tempfile::TempDir;

    async fn create_test_service() -> (NotesService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = NotesService::open_with_interval(
            temp_dir.path().join("notes.bin"),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
        (service, temp_dir)
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("Groceries", "milk"), "Groceries");
        assert_eq!(derive_title("", "short body"), "short body");

        let long = "x".repeat(80);
        let title = derive_title("  ", &long);
        assert_eq!(title, format!("{}...", "x".repeat(57)));

        let exact = "y".repeat(57);
        assert_eq!(derive_title("", &exact), exact);
    }

    #[tokio::test]
    async fn test_create_and_edit_text_note() {
        let (service, _temp) = create_test_service().await;

        let note = service.create_text_note("", "Buy milk", false).unwrap();
        assert_eq!(note.title(), "Buy milk");
        assert!(note.mod_time() > 0);
        assert!(note.is_saved());

        let edited = service
            .edit_note(note.entry_id(), "Shopping", "Buy milk and eggs", true)
            .unwrap();
        assert_eq!(edited.title(), "Shopping");
        assert!(edited.marked());

        let listed = service.list_notes(&NoteQuery::default());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].text(), "Buy milk and eggs");
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let (service, _temp) = create_test_service().await;

        assert!(matches!(
            service.create_text_note("Title", "", false),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(service.list_notes(&NoteQuery::default()).is_empty());
    }

    #[tokio::test]
    async fn test_resource_notes() {
        let (service, _temp) = create_test_service().await;

        let audio = service
            .create_resource_note(NoteType::Audio, "Memo", "/Media/memo.amr", false)
            .unwrap();
        assert_eq!(audio.resource_path(), "/Media/memo.amr");

        assert!(service
            .create_resource_note(NoteType::Text, "t", "/x", false)
            .is_err());
        assert!(service
            .create_resource_note(NoteType::Photo, "p", "", false)
            .is_err());
    }

    #[tokio::test]
    async fn test_set_marked_and_delete() {
        let (service, _temp) = create_test_service().await;

        let a = service.create_text_note("A", "first", false).unwrap();
        let b = service.create_text_note("B", "second", false).unwrap();

        service.set_marked(a.entry_id(), true).unwrap();
        let listed = service.list_notes(&NoteQuery::sorted(SortKey::Title, SortOrder::Descending));
        assert_eq!(listed[0].title(), "A");

        service.delete_note(b.entry_id()).unwrap();
        let err = service.delete_note(b.entry_id()).unwrap_err();
        assert!(err.is_not_found());

        let found = service.list_notes(&NoteQuery::default().with_filter(FilterMode::ByText, "FIRST"));
        assert_eq!(found.len(), 1);
    }
}
