//! Database module
//!
//! This module provides all note persistence:
//! - Schema creation and version check
//! - Model definitions
//! - Store adapter owning the SQLite file
//! - Repository layer for note CRUD and batch write-through

pub mod models;
pub mod repository;
pub mod schema;
pub mod store;

pub use models::*;
pub use repository::NotesRepository;
pub use store::{EntryIdAllocator, NoteStore};

use crate::config::STORE_BUSY_TIMEOUT;
use sqlx::sqlite::SqliteConnectOptions;
use std::path::Path;

/// Build connection options for a note store file. The journal mode is
/// left alone until the file has been verified.
fn connect_options(db_path: &Path, create_if_missing: bool) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(create_if_missing)
        .busy_timeout(STORE_BUSY_TIMEOUT)
}
