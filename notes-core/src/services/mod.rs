//! Services module
//!
//! Business logic that sits between the application state and the
//! repository: the write-through note cache, its background flush worker,
//! note composition and persisted preferences.

pub mod flush_worker;
pub mod notes;
pub mod notes_cache;
pub mod preferences;

pub use flush_worker::{FlushWorker, WorkerState};
pub use notes::NotesService;
pub use notes_cache::{FlushOutcome, NotesCache};
pub use preferences::{ListPreferences, Preferences, PreferencesService};
