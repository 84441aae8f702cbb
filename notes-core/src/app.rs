//! Application state and initialization
//!
//! This module manages the central application state and lifecycle.
//! The notes service and preferences are initialized here and made
//! available through AppState.

use crate::database::Note;
use crate::error::Result;
use crate::services::{NotesService, PreferencesService};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling this more than once is harmless.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "allnotes=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Central application state holding all services
pub struct AppState {
    pub app_data_dir: PathBuf,
    pub preferences: PreferencesService,
    notes: RwLock<NotesService>,
    flush_interval: Duration,
}

impl AppState {
    /// Create directories, load preferences and open the chosen store
    pub async fn initialize(app_data_dir: PathBuf) -> Result<Self> {
        Self::initialize_with_interval(app_data_dir, crate::config::FLUSH_INTERVAL).await
    }

    pub async fn initialize_with_interval(
        app_data_dir: PathBuf,
        flush_interval: Duration,
    ) -> Result<Self> {
        tracing::info!("Initializing application");
        tracing::info!("App data directory: {:?}", app_data_dir);

        tokio::fs::create_dir_all(&app_data_dir).await?;

        let preferences = PreferencesService::new(app_data_dir.clone());
        let store_path = preferences.store_path().await?;
        let notes = NotesService::open_with_interval(&store_path, flush_interval).await?;

        tracing::info!("Application initialized successfully");

        Ok(Self {
            app_data_dir,
            preferences,
            notes: RwLock::new(notes),
            flush_interval,
        })
    }

    /// Access the notes service for the active store
    pub async fn notes(&self) -> RwLockReadGuard<'_, NotesService> {
        self.notes.read().await
    }

    pub async fn store_path(&self) -> PathBuf {
        self.notes.read().await.path().to_path_buf()
    }

    /// List notes using the saved sort and filter choices
    pub async fn list_notes(&self, filter_text: &str) -> Result<Vec<Note>> {
        let list = self.preferences.list().await?;
        Ok(self.notes.read().await.list_notes(&list.query(filter_text)))
    }

    /// Move to another store file, creating it when missing.
    ///
    /// The current store keeps serving if its pending changes cannot be
    /// written or the new store cannot be opened.
    pub async fn switch_store(&self, path: &Path) -> Result<()> {
        let mut notes = self.notes.write().await;
        if notes.path() == path {
            return Ok(());
        }

        notes.flush().await?;
        let opened = NotesService::open_with_interval(path, self.flush_interval).await?;
        let previous = std::mem::replace(&mut *notes, opened);
        drop(notes);

        let previous_path = previous.path().to_path_buf();
        if let Err(e) = previous.close().await {
            tracing::warn!("Failed to close store {:?}: {}", previous_path, e);
        }

        self.preferences.set_store_path(path).await?;
        tracing::info!("Switched note store to {:?}", path);

        Ok(())
    }

    /// Flush pending changes and stop background work
    pub async fn shutdown(self) -> Result<()> {
        tracing::info!("Shutting down");
        self.notes.into_inner().close().await
    }
}
