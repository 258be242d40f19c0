//! Application state and the reducer every mutation goes through.
//!
//! [`AppState::dispatch`] validates an [`Action`] before touching anything, so a rejected action
//! leaves the state exactly as it was.  The returned [`Changes`] tell the caller which persisted
//! collections need saving.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{names_match, CategoryList, FavoriteRecord, HerbRecord, HerbalOil, Spell};

/// Maximum number of remembered searches.
pub const HISTORY_LIMIT: usize = 10;

/// Color scheme preference.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Self::Dark => Self::Light,
            Self::Light => Self::Dark,
        }
    }
}

/// The user's answer to a destructive-action prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed,
    Declined,
}

/// Progress of the current herb search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SearchStatus {
    #[default]
    Idle,
    Loading { query: String },
    Found { herb: HerbRecord, image: String },
    Failed { message: String },
}

/// Fields of a spell as entered by the user.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpellDraft {
    pub name: String,
    pub ingredients: Vec<String>,
    pub instructions: String,
}

/// Every mutation of [`AppState`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    AddFavorite { herb: HerbRecord, image: String },
    RemoveFavorite(String),
    ClearFavorites(Confirmation),
    /// Assigns `category` to the named favorite; `None` makes it uncategorized.
    AssignCategory { herb: String, category: Option<String> },
    AddCategory(String),
    RenameCategory { from: String, to: String },
    DeleteCategory { name: String, confirmation: Confirmation },
    AddSpell(SpellDraft),
    UpdateSpell { id: String, draft: SpellDraft },
    DeleteSpell { id: String, confirmation: Confirmation },
    RecordSearch(String),
    ClearHistory,
    SetTheme(Theme),
    ToggleTheme,
    SearchStarted(String),
    SearchSucceeded { herb: HerbRecord, image: String },
    SearchFailed(String),
    ResetSearch,
}

/// Persisted collections touched by an action.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Changes {
    pub favorites: bool,
    pub categories: bool,
    pub spells: bool,
    pub history: bool,
    pub theme: bool,
}

impl Changes {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn favorites() -> Self {
        Self {
            favorites: true,
            ..Self::default()
        }
    }

    fn spells() -> Self {
        Self {
            spells: true,
            ..Self::default()
        }
    }

    fn history() -> Self {
        Self {
            history: true,
            ..Self::default()
        }
    }

    fn theme() -> Self {
        Self {
            theme: true,
            ..Self::default()
        }
    }
}

/// Reasons an action is rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateError {
    /// A required field is blank.
    EmptyField(&'static str),
    DuplicateFavorite(String),
    DuplicateCategory(String),
    UnknownCategory(String),
    /// A spell must use at least one herb.
    NoIngredients,
    NotFound { kind: &'static str, name: String },
    /// The user declined a destructive action.
    ConfirmationDeclined,
    /// A search is already running.
    SearchInProgress,
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "Please fill out the {} field", field),
            Self::DuplicateFavorite(name) => write!(f, "\"{}\" is already in the grimoire", name),
            Self::DuplicateCategory(name) => {
                write!(f, "A category named \"{}\" already exists", name)
            }
            Self::UnknownCategory(name) => write!(f, "There is no category named \"{}\"", name),
            Self::NoIngredients => write!(f, "A spell needs at least one ingredient"),
            Self::NotFound { kind, name } => write!(f, "No {} named \"{}\"", kind, name),
            Self::ConfirmationDeclined => write!(f, "The action was cancelled"),
            Self::SearchInProgress => write!(f, "A search is already in progress"),
        }
    }
}

impl std::error::Error for StateError {}

/// Everything the application knows, owned in one place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AppState {
    favorites: Vec<FavoriteRecord>,
    categories: CategoryList,
    spells: Vec<Spell>,
    history: Vec<String>,
    theme: Theme,
    search: SearchStatus,
    next_spell_id: u64,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a state from persisted collections.  Over-long history is trimmed.
    pub fn from_parts(
        favorites: Vec<FavoriteRecord>,
        categories: CategoryList,
        spells: Vec<Spell>,
        mut history: Vec<String>,
        theme: Theme,
    ) -> Self {
        history.truncate(HISTORY_LIMIT);
        Self {
            favorites,
            categories,
            spells,
            history,
            theme,
            ..Self::default()
        }
    }

    pub fn favorites(&self) -> &[FavoriteRecord] {
        &self.favorites
    }

    pub fn favorite(&self, name: &str) -> Option<&FavoriteRecord> {
        self.favorites.iter().find(|favorite| favorite.is_named(name))
    }

    pub fn is_favorite(&self, name: &str) -> bool {
        self.favorite(name).is_some()
    }

    pub fn categories(&self) -> &CategoryList {
        &self.categories
    }

    pub fn spells(&self) -> &[Spell] {
        &self.spells
    }

    /// Past queries, most recent first.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn search(&self) -> &SearchStatus {
        &self.search
    }

    /// Applies `action`, returning which persisted collections changed.
    pub fn dispatch(&mut self, action: Action) -> Result<Changes, StateError> {
        match action {
            Action::AddFavorite { herb, image } => self.add_favorite(herb, image),
            Action::RemoveFavorite(name) => {
                let index = self
                    .favorites
                    .iter()
                    .position(|favorite| favorite.is_named(&name))
                    .ok_or_else(|| not_found("favorite", &name))?;
                self.favorites.remove(index);
                Ok(Changes::favorites())
            }
            Action::ClearFavorites(confirmation) => {
                confirm(confirmation)?;
                if self.favorites.is_empty() {
                    return Ok(Changes::none());
                }
                self.favorites.clear();
                Ok(Changes::favorites())
            }
            Action::AssignCategory { herb, category } => self.assign_category(&herb, category),
            Action::AddCategory(name) => {
                let name = required(&name, "category name")?;
                if self.categories.contains(name) {
                    return Err(StateError::DuplicateCategory(name.to_string()));
                }
                self.categories.insert(name);
                Ok(Changes {
                    categories: true,
                    ..Changes::default()
                })
            }
            Action::RenameCategory { from, to } => self.rename_category(&from, &to),
            Action::DeleteCategory { name, confirmation } => {
                let canonical = self
                    .categories
                    .find(&name)
                    .ok_or_else(|| not_found("category", &name))?
                    .to_string();
                confirm(confirmation)?;
                self.categories.remove(&canonical);
                let mut favorites_changed = false;
                for favorite in &mut self.favorites {
                    if favorite
                        .category
                        .as_deref()
                        .is_some_and(|category| names_match(category, &canonical))
                    {
                        favorite.category = None;
                        favorites_changed = true;
                    }
                }
                Ok(Changes {
                    categories: true,
                    favorites: favorites_changed,
                    ..Changes::default()
                })
            }
            Action::AddSpell(draft) => {
                let (name, ingredients, instructions) = validate_spell(draft)?;
                let id = self.fresh_spell_id();
                self.spells.push(Spell {
                    id,
                    name,
                    ingredients,
                    instructions,
                });
                Ok(Changes::spells())
            }
            Action::UpdateSpell { id, draft } => {
                let index = self.spell_index(&id)?;
                let (name, ingredients, instructions) = validate_spell(draft)?;
                let spell = &mut self.spells[index];
                spell.name = name;
                spell.ingredients = ingredients;
                spell.instructions = instructions;
                Ok(Changes::spells())
            }
            Action::DeleteSpell { id, confirmation } => {
                let index = self.spell_index(&id)?;
                confirm(confirmation)?;
                self.spells.remove(index);
                Ok(Changes::spells())
            }
            Action::RecordSearch(query) => Ok(self.record_search(&query)),
            Action::ClearHistory => {
                if self.history.is_empty() {
                    return Ok(Changes::none());
                }
                self.history.clear();
                Ok(Changes::history())
            }
            Action::SetTheme(theme) => {
                if self.theme == theme {
                    return Ok(Changes::none());
                }
                self.theme = theme;
                Ok(Changes::theme())
            }
            Action::ToggleTheme => {
                self.theme = self.theme.toggled();
                Ok(Changes::theme())
            }
            Action::SearchStarted(query) => {
                if matches!(self.search, SearchStatus::Loading { .. }) {
                    return Err(StateError::SearchInProgress);
                }
                let query = required(&query, "search")?.to_string();
                let changes = self.record_search(&query);
                self.search = SearchStatus::Loading { query };
                Ok(changes)
            }
            Action::SearchSucceeded { herb, image } => {
                self.search = SearchStatus::Found { herb, image };
                Ok(Changes::none())
            }
            Action::SearchFailed(message) => {
                self.search = SearchStatus::Failed { message };
                Ok(Changes::none())
            }
            Action::ResetSearch => {
                self.search = SearchStatus::Idle;
                Ok(Changes::none())
            }
        }
    }

    fn add_favorite(&mut self, herb: HerbRecord, image: String) -> Result<Changes, StateError> {
        let name = required(&herb.name, "name")?;
        if self.is_favorite(name) {
            return Err(StateError::DuplicateFavorite(name.to_string()));
        }
        self.favorites.push(FavoriteRecord::new(herb, image));
        Ok(Changes::favorites())
    }

    fn assign_category(
        &mut self,
        herb: &str,
        category: Option<String>,
    ) -> Result<Changes, StateError> {
        let category = match category.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(name) => Some(
                self.categories
                    .find(name)
                    .ok_or_else(|| StateError::UnknownCategory(name.to_string()))?
                    .to_string(),
            ),
        };
        let favorite = self
            .favorites
            .iter_mut()
            .find(|favorite| favorite.is_named(herb))
            .ok_or_else(|| not_found("favorite", herb))?;
        favorite.category = category;
        Ok(Changes::favorites())
    }

    fn rename_category(&mut self, from: &str, to: &str) -> Result<Changes, StateError> {
        let to = required(to, "category name")?;
        let current = self
            .categories
            .find(from)
            .ok_or_else(|| not_found("category", from))?
            .to_string();
        let previous = self
            .categories
            .rename(&current, to)
            .ok_or_else(|| StateError::DuplicateCategory(to.to_string()))?;

        for favorite in &mut self.favorites {
            if favorite
                .category
                .as_deref()
                .is_some_and(|category| names_match(category, &previous))
            {
                favorite.category = Some(to.to_string());
            }
        }
        Ok(Changes {
            categories: true,
            favorites: true,
            ..Changes::default()
        })
    }

    fn record_search(&mut self, query: &str) -> Changes {
        let query = query.trim();
        if query.is_empty() {
            return Changes::none();
        }
        self.history.retain(|past| !names_match(past, query));
        self.history.insert(0, query.to_string());
        self.history.truncate(HISTORY_LIMIT);
        Changes::history()
    }

    fn spell_index(&self, id: &str) -> Result<usize, StateError> {
        self.spells
            .iter()
            .position(|spell| spell.id == id)
            .ok_or_else(|| not_found("spell", id))
    }

    fn fresh_spell_id(&mut self) -> String {
        loop {
            self.next_spell_id += 1;
            let id = format!("spell-{}", self.next_spell_id);
            if !self.spells.iter().any(|spell| spell.id == id) {
                return id;
            }
        }
    }
}

fn not_found(kind: &'static str, name: &str) -> StateError {
    StateError::NotFound {
        kind,
        name: name.to_string(),
    }
}

fn confirm(confirmation: Confirmation) -> Result<(), StateError> {
    match confirmation {
        Confirmation::Confirmed => Ok(()),
        Confirmation::Declined => Err(StateError::ConfirmationDeclined),
    }
}

fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, StateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(StateError::EmptyField(field))
    } else {
        Ok(trimmed)
    }
}

fn validate_spell(draft: SpellDraft) -> Result<(String, Vec<String>, String), StateError> {
    let name = required(&draft.name, "spell name")?.to_string();
    let instructions = required(&draft.instructions, "instructions")?.to_string();
    let mut ingredients: Vec<String> = Vec::new();
    for ingredient in draft.ingredients {
        let ingredient = ingredient.trim();
        if !ingredient.is_empty()
            && !ingredients
                .iter()
                .any(|known| names_match(known, ingredient))
        {
            ingredients.push(ingredient.to_string());
        }
    }
    if ingredients.is_empty() {
        return Err(StateError::NoIngredients);
    }
    Ok((name, ingredients, instructions))
}

/// The manual "add herb" form, as raw text fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ManualHerbForm {
    pub name: String,
    pub scientific_name: String,
    /// Comma separated.
    pub magical_properties: String,
    pub elemental_association: String,
    pub planetary_association: String,
    /// Comma separated, optional.
    pub deity_association: String,
    pub lore: String,
    pub usage: String,
    pub herbal_oil_lore: String,
    pub herbal_oil_usage: String,
}

impl ManualHerbForm {
    /// Validates the required fields and builds the herb record.
    pub fn into_record(self) -> Result<HerbRecord, StateError> {
        let name = required(&self.name, "name")?.to_string();
        let scientific_name = required(&self.scientific_name, "scientific name")?.to_string();
        let magical_properties =
            split_list(required(&self.magical_properties, "magical properties")?);
        if magical_properties.is_empty() {
            return Err(StateError::EmptyField("magical properties"));
        }
        let elemental_association =
            required(&self.elemental_association, "elemental association")?.to_string();
        let planetary_association =
            required(&self.planetary_association, "planetary association")?.to_string();
        let lore = required(&self.lore, "lore")?.to_string();
        let usage = required(&self.usage, "usage")?.to_string();

        let deities = split_list(&self.deity_association);
        let (oil_lore, oil_usage) = (self.herbal_oil_lore.trim(), self.herbal_oil_usage.trim());
        let herbal_oil = (!oil_lore.is_empty() || !oil_usage.is_empty()).then(|| HerbalOil {
            lore: oil_lore.to_string(),
            usage: oil_usage.to_string(),
        });

        Ok(HerbRecord {
            name,
            scientific_name,
            magical_properties,
            elemental_association,
            planetary_association,
            deity_association: (!deities.is_empty()).then_some(deities),
            lore,
            usage,
            herbal_oil,
            complementary_essences: None,
            external_resources: None,
        })
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
