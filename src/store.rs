//! Persistence of the collection as JSON values under fixed keys.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::model::{CategoryList, FavoriteRecord, Spell};
use crate::state::{AppState, Changes, Theme};

pub const FAVORITES_KEY: &str = "favorites";
pub const CATEGORIES_KEY: &str = "categories";
pub const SPELLS_KEY: &str = "spells";
pub const HISTORY_KEY: &str = "searchHistory";
pub const THEME_KEY: &str = "theme";

/// Errors raised while reading or writing persisted values.
#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: io::Error },
    Serialize(serde_json::Error),
    /// The in-memory store's lock was poisoned by a panicking writer.
    Poisoned,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "Failed to access {}: {}", path.display(), source)
            }
            Self::Serialize(err) => write!(f, "Failed to encode value: {}", err),
            Self::Poisoned => write!(f, "The store is unusable after a panic"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize(err) => Some(err),
            Self::Poisoned => None,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err)
    }
}

/// String values addressed by key.
pub trait KeyValueStore: Send + Sync {
    /// The stored text, or `None` when nothing was saved under `key`.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Keeps values in memory; useful for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().map_err(|_| StoreError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    directory: PathBuf,
}

impl DirectoryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", key))
    }
}

impl KeyValueStore for DirectoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.directory).map_err(|source| StoreError::Io {
            path: self.directory.clone(),
            source,
        })?;
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|source| StoreError::Io { path, source })
    }
}

/// Loads and saves the whole application state through a [`KeyValueStore`].
#[derive(Debug)]
pub struct Library<S> {
    store: S,
}

impl<S: KeyValueStore> Library<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Restores the state.  Missing or unreadable values fall back to empty defaults.
    pub fn load(&self) -> AppState {
        let favorites: Vec<FavoriteRecord> = self.load_or_default(FAVORITES_KEY);
        let categories: CategoryList = self.load_or_default(CATEGORIES_KEY);
        let spells: Vec<Spell> = self.load_or_default(SPELLS_KEY);
        let history: Vec<String> = self.load_or_default(HISTORY_KEY);
        let theme: Theme = self.load_or_default(THEME_KEY);
        debug!(
            "Loaded {} favorite(s), {} categor(ies), {} spell(s)",
            favorites.len(),
            categories.len(),
            spells.len()
        );
        AppState::from_parts(favorites, categories, spells, history, theme)
    }

    /// Writes the collections flagged in `changes`.
    pub fn save(&self, state: &AppState, changes: Changes) -> Result<(), StoreError> {
        if changes.favorites {
            self.save_value(FAVORITES_KEY, &state.favorites())?;
        }
        if changes.categories {
            self.save_value(CATEGORIES_KEY, state.categories())?;
        }
        if changes.spells {
            self.save_value(SPELLS_KEY, &state.spells())?;
        }
        if changes.history {
            self.save_value(HISTORY_KEY, &state.history())?;
        }
        if changes.theme {
            self.save_value(THEME_KEY, &state.theme())?;
        }
        Ok(())
    }

    pub fn save_all(&self, state: &AppState) -> Result<(), StoreError> {
        self.save(
            state,
            Changes {
                favorites: true,
                categories: true,
                spells: true,
                history: true,
                theme: true,
            },
        )
    }

    fn save_value<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(value)?;
        self.store.save(key, &text)
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let text = match self.store.load(key) {
            Ok(Some(text)) => text,
            Ok(None) => return T::default(),
            Err(err) => {
                warn!("Could not read \"{}\", starting empty: {}", key, err);
                return T::default();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!("Stored \"{}\" is corrupted, starting empty: {}", key, err);
            T::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::herb;
    use crate::state::{Action, SpellDraft};

    fn populated() -> AppState {
        let mut state = AppState::new();
        for name in ["Sage", "Rue"] {
            state
                .dispatch(Action::AddFavorite {
                    herb: herb(name),
                    image: format!("{}.png", name),
                })
                .expect("add favorite");
        }
        state.dispatch(Action::AddCategory("Healing".into())).expect("add category");
        state
            .dispatch(Action::AssignCategory {
                herb: "Rue".into(),
                category: Some("Healing".into()),
            })
            .expect("assign");
        state
            .dispatch(Action::AddSpell(SpellDraft {
                name: "Ward".into(),
                ingredients: vec!["Sage".into()],
                instructions: "Burn at dusk".into(),
            }))
            .expect("add spell");
        state.dispatch(Action::RecordSearch("Mugwort".into())).expect("record");
        state.dispatch(Action::ToggleTheme).expect("toggle");
        state
    }

    #[test]
    fn collections_survive_a_round_trip() {
        let library = Library::new(MemoryStore::new());
        let state = populated();

        library.save_all(&state).expect("save");
        let restored = library.load();

        assert_eq!(restored.favorites(), state.favorites());
        assert_eq!(restored.categories(), state.categories());
        assert_eq!(restored.spells(), state.spells());
        assert_eq!(restored.history(), state.history());
        assert_eq!(restored.theme(), Theme::Light);
    }

    #[test]
    fn corrupted_values_fall_back_to_defaults() {
        let store = MemoryStore::new();
        store.save(FAVORITES_KEY, "{not json").expect("save");
        store.save(HISTORY_KEY, "[\"Sage\"]").expect("save");

        let state = Library::new(store).load();

        assert!(state.favorites().is_empty());
        assert_eq!(state.history(), ["Sage".to_string()]);
        assert_eq!(state.theme(), Theme::Dark);
    }

    #[test]
    fn hand_edited_duplicate_categories_collapse_on_load() {
        let store = MemoryStore::new();
        store
            .save(CATEGORIES_KEY, r#"["Healing","HEALING","Love"]"#)
            .expect("save");

        let state = Library::new(store).load();

        assert_eq!(state.categories().names(), ["Healing", "Love"]);
    }

    #[test]
    fn only_changed_collections_are_written() {
        let library = Library::new(MemoryStore::new());
        let state = populated();

        library
            .save(
                &state,
                Changes {
                    history: true,
                    ..Changes::default()
                },
            )
            .expect("save");

        assert!(library.store().load(HISTORY_KEY).expect("load").is_some());
        assert!(library.store().load(FAVORITES_KEY).expect("load").is_none());
    }

    #[test]
    fn favorites_use_camel_case_fields() {
        let library = Library::new(MemoryStore::new());
        library.save_all(&populated()).expect("save");

        let text = library.store().load(FAVORITES_KEY).expect("load").expect("saved");
        assert!(text.contains("\"scientificName\":\"Sage officinalis\""));
        assert!(text.contains("\"category\":\"Healing\""));
    }

    #[test]
    fn directory_store_writes_one_file_per_key() {
        let dir = std::env::temp_dir().join(format!("herb_grimoire_store_{}", std::process::id()));
        let library = Library::new(DirectoryStore::new(&dir));
        let state = populated();

        library.save_all(&state).expect("save");

        assert!(dir.join("favorites.json").is_file());
        assert!(dir.join("searchHistory.json").is_file());
        assert_eq!(library.load().favorites(), state.favorites());
        assert!(library.store().load("missing").expect("load").is_none());
        let _ = fs::remove_dir_all(&dir);
    }
}
