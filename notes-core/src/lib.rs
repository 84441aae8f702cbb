//! AllNotes library
//!
//! Note storage for the AllNotes application: a versioned SQLite store,
//! an in-memory write-through cache over it, and the services the user
//! interface drives.

pub mod app;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
