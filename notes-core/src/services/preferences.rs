//! Preferences service
//!
//! Persists list presentation choices and the active store path as JSON.

use crate::config::{DEFAULT_STORE_FILE_NAME, PREFERENCES_FILE_NAME};
use crate::database::{FilterMode, NoteQuery, SortKey, SortOrder, TypeFilter};
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// How the note list is sorted and filtered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListPreferences {
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(default)]
    pub filter_mode: FilterMode,
    #[serde(default)]
    pub type_filter: TypeFilter,
}

impl ListPreferences {
    /// Build a list query for the given search text
    pub fn query(&self, filter_text: impl Into<String>) -> NoteQuery {
        NoteQuery::sorted(self.sort, self.order)
            .with_type(self.type_filter)
            .with_filter(self.filter_mode, filter_text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub list: ListPreferences,
    /// Store file in use (if None, uses app_data_dir/notes.bin)
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

/// Service for loading and saving preferences
#[derive(Clone)]
pub struct PreferencesService {
    app_data_dir: PathBuf,
    preferences_path: PathBuf,
}

impl PreferencesService {
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            preferences_path: app_data_dir.join(PREFERENCES_FILE_NAME),
            app_data_dir,
        }
    }

    /// Store used when none has been chosen
    pub fn default_store_path(&self) -> PathBuf {
        self.app_data_dir.join(DEFAULT_STORE_FILE_NAME)
    }

    /// Load preferences from disk or create defaults if not exists
    pub async fn load(&self) -> Result<Preferences> {
        if !fs::try_exists(&self.preferences_path).await? {
            tracing::info!("Preferences file not found, creating defaults");
            let default = Preferences::default();
            self.save(&default).await?;
            return Ok(default);
        }

        let content = fs::read_to_string(&self.preferences_path).await?;
        let preferences: Preferences = serde_json::from_str(&content)
            .map_err(|e| AppError::Generic(format!("Failed to parse preferences: {}", e)))?;

        Ok(preferences)
    }

    pub async fn save(&self, preferences: &Preferences) -> Result<()> {
        let content = serde_json::to_string_pretty(preferences)?;

        if let Some(parent) = self.preferences_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.preferences_path, content).await?;
        tracing::debug!("Preferences saved to {:?}", self.preferences_path);

        Ok(())
    }

    /// Load, modify and save in one step
    pub async fn update<F>(&self, change: F) -> Result<Preferences>
    where
        F: FnOnce(&mut Preferences),
    {
        let mut preferences = self.load().await?;
        change(&mut preferences);
        self.save(&preferences).await?;
        Ok(preferences)
    }

    pub async fn list(&self) -> Result<ListPreferences> {
        Ok(self.load().await?.list)
    }

    pub async fn update_list(&self, list: ListPreferences) -> Result<()> {
        self.update(|p| p.list = list).await?;
        Ok(())
    }

    /// Resolved store path: the saved choice, or the default
    pub async fn store_path(&self) -> Result<PathBuf> {
        let preferences = self.load().await?;
        Ok(preferences
            .store_path
            .unwrap_or_else(|| self.default_store_path()))
    }

    pub async fn set_store_path(&self, path: &Path) -> Result<()> {
        let path = path.to_path_buf();
        self.update(|p| p.store_path = Some(path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::NoteType;
    use tempfile::TempDir;

    fn create_test_service() -> (PreferencesService, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let service = PreferencesService::new(temp_dir.path().to_path_buf());
        (service, temp_dir)
    }

    #[tokio::test]
    async fn test_defaults_created_on_load() {
        let (service, temp) = create_test_service();

        let preferences = service.load().await.unwrap();

        assert_eq!(preferences.list.sort, SortKey::Date);
        assert_eq!(preferences.list.order, SortOrder::Descending);
        assert_eq!(preferences.list.filter_mode, FilterMode::ByTitle);
        assert_eq!(preferences.list.type_filter, TypeFilter::All);
        assert!(preferences.store_path.is_none());
        assert!(temp.path().join(PREFERENCES_FILE_NAME).exists());

        let store = service.store_path().await.unwrap();
        assert_eq!(store, temp.path().join("notes.bin"));
    }

    #[tokio::test]
    async fn test_preferences_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().to_path_buf();
        let custom_store = dir.join("card").join("notes.bin");

        {
            let service = PreferencesService::new(dir.clone());
            service
                .update_list(ListPreferences {
                    sort: SortKey::Title,
                    order: SortOrder::Ascending,
                    filter_mode: FilterMode::ByText,
                    type_filter: TypeFilter::Only(NoteType::Photo),
                })
                .await
                .unwrap();
            service.set_store_path(&custom_store).await.unwrap();
        }

        {
            let service = PreferencesService::new(dir);
            let loaded = service.load().await.unwrap();
            assert_eq!(loaded.list.sort, SortKey::Title);
            assert_eq!(loaded.list.order, SortOrder::Ascending);
            assert_eq!(loaded.list.filter_mode, FilterMode::ByText);
            assert_eq!(loaded.list.type_filter, TypeFilter::Only(NoteType::Photo));
            assert_eq!(service.store_path().await.unwrap(), custom_store);
        }
    }

    #[tokio::test]
    async fn test_missing_fields_use_defaults() {
        let (service, temp) = create_test_service();
        std::fs::write(
            temp.path().join(PREFERENCES_FILE_NAME),
            r#"{"list": {"sort": "type"}}"#,
        )
        .unwrap();

        let loaded = service.load().await.unwrap();
        assert_eq!(loaded.list.sort, SortKey::Type);
        assert_eq!(loaded.list.order, SortOrder::Descending);
        assert!(loaded.store_path.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_error() {
        let (service, temp) = create_test_service();
        std::fs::write(temp.path().join(PREFERENCES_FILE_NAME), "not json").unwrap();

        assert!(service.load().await.is_err());
    }

    #[test]
    fn test_list_query() {
        let list = ListPreferences {
            sort: SortKey::Title,
            order: SortOrder::Ascending,
            filter_mode: FilterMode::ByText,
            type_filter: TypeFilter::All,
        };

        let query = list.query("milk");
        assert_eq!(query.sort, SortKey::Title);
        assert_eq!(query.filter_mode, FilterMode::ByText);
        assert_eq!(query.filter_text, "milk");
    }
}
