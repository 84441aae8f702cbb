//! Cached notes manager
//!
//! Loads every note once, then serves adds, edits, removals and listings
//! from memory. Mutations mark the cache dirty and ask the background
//! [`FlushWorker`] to write through; the worker also flushes on a fixed
//! interval.
//!
//! A flush snapshots the unsaved notes and pending deletions under the
//! cache lock, writes them in one transaction without holding the lock,
//! then marks serialized only the notes that did not change meanwhile.

use crate::config::FLUSH_INTERVAL;
use crate::database::repository::BatchSummary;
use crate::database::{compare_notes, Note, NoteQuery, NotesRepository};
use crate::error::{AppError, Result};
use crate::services::flush_worker::{FlushWorker, WorkerState};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// What a flush did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was dirty
    Clean,
    Written(BatchSummary),
}

#[derive(Default)]
struct CacheState {
    notes: Vec<Note>,
    /// Ids removed from `notes` whose rows may still exist
    removed: Vec<i64>,
    dirty: bool,
}

impl CacheState {
    fn position(&self, entry_id: i64) -> Option<usize> {
        self.notes.iter().position(|n| n.entry_id() == entry_id)
    }

    fn has_pending_writes(&self) -> bool {
        !self.removed.is_empty() || self.notes.iter().any(|n| !n.is_serialized())
    }
}

struct CacheCore {
    repo: NotesRepository,
    state: Mutex<CacheState>,
    /// Serializes flushes from the worker and from explicit `flush` calls
    flush_lock: tokio::sync::Mutex<()>,
}

impl CacheCore {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn flush(&self) -> Result<FlushOutcome> {
        let _flushing = self.flush_lock.lock().await;

        let (mut batch, removed) = {
            let state = self.lock();
            if !state.dirty {
                return Ok(FlushOutcome::Clean);
            }
            let batch: Vec<Note> = state
                .notes
                .iter()
                .filter(|n| !n.is_serialized())
                .cloned()
                .collect();
            (batch, state.removed.clone())
        };

        let summary = self.repo.write_batch(&mut batch, &removed).await?;

        let mut state = self.lock();
        for written in &batch {
            if let Some(index) = state.position(written.entry_id()) {
                let cached = &mut state.notes[index];
                if cached.same_content(written) {
                    cached.set_serialized(true);
                }
            }
        }
        state.removed.retain(|id| !removed.contains(id));
        state.dirty = state.has_pending_writes();

        tracing::debug!(
            "Flushed note cache ({} written, still dirty: {})",
            batch.len(),
            state.dirty
        );
        Ok(FlushOutcome::Written(summary))
    }
}

/// In-memory note collection backed by a note store
pub struct NotesCache {
    core: Arc<CacheCore>,
    worker: FlushWorker,
}

impl NotesCache {
    /// Open (or create) the store at `path` and load it
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_interval(path, FLUSH_INTERVAL).await
    }

    pub async fn open_with_interval(path: impl AsRef<Path>, interval: Duration) -> Result<Self> {
        let repo = NotesRepository::open(path).await?;
        Self::with_repository(repo, interval).await
    }

    /// Load every note from `repo` and start the flush worker
    pub async fn with_repository(repo: NotesRepository, interval: Duration) -> Result<Self> {
        let notes = repo.query_notes(&NoteQuery::default()).await?;

        tracing::info!("Cached {} notes from {:?}", notes.len(), repo.path());

        let core = Arc::new(CacheCore {
            repo,
            state: Mutex::new(CacheState {
                notes,
                ..CacheState::default()
            }),
            flush_lock: tokio::sync::Mutex::new(()),
        });

        let worker_core = Arc::clone(&core);
        let worker = FlushWorker::start(interval, move || {
            let core = Arc::clone(&worker_core);
            async move { core.flush().await.map(|_| ()) }
        });

        Ok(Self { core, worker })
    }

    pub fn path(&self) -> &Path {
        self.core.repo.path()
    }

    pub fn repository(&self) -> &NotesRepository {
        &self.core.repo
    }

    /// Add a new note, returning the id it was given.
    /// A note that already has an id is treated as an update.
    pub fn add_note(&self, mut note: Note) -> Result<i64> {
        if note.is_saved() {
            let entry_id = note.entry_id();
            self.update_note(note)?;
            return Ok(entry_id);
        }

        let entry_id = self.core.repo.store().ids().reserve();
        note.assign_entry_id(entry_id);
        note.set_serialized(false);

        {
            let mut state = self.core.lock();
            state.notes.push(note);
            state.dirty = true;
        }

        tracing::debug!("Cached new note: {}", entry_id);
        self.worker.request_flush();
        Ok(entry_id)
    }

    /// Replace the cached copy of an edited note
    pub fn update_note(&self, note: Note) -> Result<()> {
        if !note.is_saved() {
            return Err(AppError::InvalidArgument(
                "cannot update a note that was never added".to_string(),
            ));
        }
        if note.is_serialized() {
            return Err(AppError::InvalidArgument(format!(
                "note {} has no unsaved changes",
                note.entry_id()
            )));
        }

        let entry_id = note.entry_id();
        {
            let mut state = self.core.lock();
            let index = state
                .position(entry_id)
                .ok_or(AppError::NoteNotFound(entry_id))?;
            let cached_type = state.notes[index].note_type();
            if cached_type != note.note_type() {
                return Err(AppError::InvalidArgument(format!(
                    "note {} is {:?}, not {:?}",
                    entry_id,
                    cached_type,
                    note.note_type()
                )));
            }
            state.notes[index] = note;
            state.dirty = true;
        }

        tracing::debug!("Cached note update: {}", entry_id);
        self.worker.request_flush();
        Ok(())
    }

    pub fn remove_note(&self, note: &Note) -> Result<Note> {
        self.remove_note_by_id(note.entry_id())
    }

    /// Remove a note from the cache, returning it
    pub fn remove_note_by_id(&self, entry_id: i64) -> Result<Note> {
        if entry_id < 0 {
            return Err(AppError::InvalidArgument(format!(
                "invalid entry id {}",
                entry_id
            )));
        }

        let removed = {
            let mut state = self.core.lock();
            let index = state
                .position(entry_id)
                .ok_or(AppError::NoteNotFound(entry_id))?;
            let removed = state.notes.remove(index);
            state.removed.push(entry_id);
            state.dirty = true;
            removed
        };

        tracing::debug!("Removed cached note: {}", entry_id);
        self.worker.request_flush();
        Ok(removed)
    }

    /// Remove every note, returning how many were cached
    pub fn remove_all(&self) -> usize {
        let count = {
            let mut state = self.core.lock();
            let notes = std::mem::take(&mut state.notes);
            let count = notes.len();
            state.removed.extend(notes.iter().map(Note::entry_id));
            state.dirty = true;
            count
        };

        tracing::info!("Removed all {} cached notes", count);
        self.worker.request_flush();
        count
    }

    /// Sort the cache by `query` and return the notes passing its filters.
    ///
    /// The sort is applied to the cache itself, so [`NotesCache::note_at`]
    /// indexes follow the order of the most recent query.
    pub fn query_notes(&self, query: &NoteQuery) -> Vec<Note> {
        let mut state = self.core.lock();
        state
            .notes
            .sort_by(|a, b| compare_notes(a, b, query.sort, query.order));

        let matches = query.matcher();
        state.notes.iter().filter(|&n| matches(n)).cloned().collect()
    }

    /// Note at `index` in the current cache order
    pub fn note_at(&self, index: usize) -> Result<Note> {
        let state = self.core.lock();
        state
            .notes
            .get(index)
            .cloned()
            .ok_or(AppError::IndexOutOfRange {
                index,
                len: state.notes.len(),
            })
    }

    /// Look up a note by id
    pub fn get_note(&self, entry_id: i64) -> Result<Note> {
        let state = self.core.lock();
        state
            .position(entry_id)
            .map(|index| state.notes[index].clone())
            .ok_or(AppError::NoteNotFound(entry_id))
    }

    pub fn len(&self) -> usize {
        self.core.lock().notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while some change has not reached the store
    pub fn is_dirty(&self) -> bool {
        self.core.lock().dirty
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Ask the worker to flush now without waiting for it
    pub fn request_flush(&self) {
        self.worker.request_flush();
    }

    /// Write pending changes now and wait for the commit
    pub async fn flush(&self) -> Result<FlushOutcome> {
        self.core.flush().await
    }

    /// Stop the worker, write pending changes and close the store
    pub async fn close(mut self) -> Result<()> {
        self.worker.stop().await;
        let flushed = self.core.flush().await;
        self.core.repo.store().close().await;
        flushed.map(|_| ())
    }
}
