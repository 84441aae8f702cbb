//! Application configuration constants
//!
//! Central location for the store format version, write-through timing
//! and note composition limits used throughout the crate.

use std::time::Duration;

// ===== Store Format =====

/// Schema version written to `db_info.ver`. Files with any other value
/// are rejected; there is no migration path.
pub const DB_VERSION: i64 = 2;

/// File name of the note store inside the app data directory
pub const DEFAULT_STORE_FILE_NAME: &str = "notes.bin";

/// How long a statement waits on a locked database file
pub const STORE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ===== Write-Through =====

/// Interval between background flushes of the note cache.
/// Bounds how much unflushed editing can be lost on a crash.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(60);

// ===== Note Composition =====

/// Number of body characters used as a title when none is given
pub const TITLE_PREVIEW_CHARS: usize = 57;

/// Appended to a derived title when the body was truncated
pub const TITLE_ELLIPSIS: &str = "...";

// ===== Preferences =====

/// File name of the persisted list preferences
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";
