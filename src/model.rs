//! Record shapes for the grimoire collection and the grouping used by reports.
//!
//! The types mirror the JSON produced by the content service and stored by the persistence
//! layer, so field names are serialized in camelCase.  Herb identity is the herb name compared
//! case-insensitively; spells reference herbs by name only, so a spell may outlive the favorite
//! it mentions.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Title of the synthetic group collecting favorites without a known category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Compares two herb or category names the way the collection defines identity.
pub fn names_match(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

/// Orders display names ignoring case and accents, so "Échinacée" sorts among the e's.
///
/// Names equal under that key fall back to lowercase and then raw comparison.
pub fn compare_display_names(left: &str, right: &str) -> Ordering {
    collation_key(left)
        .cmp(&collation_key(right))
        .then_with(|| left.to_lowercase().cmp(&right.to_lowercase()))
        .then_with(|| left.cmp(right))
}

/// Lowercase text with combining marks removed after canonical decomposition.
fn collation_key(name: &str) -> String {
    name.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Oil preparation notes attached to some herbs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HerbalOil {
    pub lore: String,
    pub usage: String,
}

/// An essence that pairs well with an herb.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplementaryEssence {
    pub name: String,
    pub purpose: String,
}

/// A link to further reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub source: String,
    pub url: String,
}

/// Lore about a single herb as returned by the content service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HerbRecord {
    pub name: String,
    pub scientific_name: String,
    pub magical_properties: Vec<String>,
    pub elemental_association: String,
    pub planetary_association: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deity_association: Option<Vec<String>>,
    pub lore: String,
    pub usage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub herbal_oil: Option<HerbalOil>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complementary_essences: Option<Vec<ComplementaryEssence>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_resources: Option<Vec<ExternalResource>>,
}

impl HerbRecord {
    /// Returns the deity list when it is present and non-empty.
    pub fn deities(&self) -> Option<&[String]> {
        self.deity_association
            .as_deref()
            .filter(|deities| !deities.is_empty())
    }

    /// Returns the complementary essences when present and non-empty.
    pub fn essences(&self) -> Option<&[ComplementaryEssence]> {
        self.complementary_essences
            .as_deref()
            .filter(|essences| !essences.is_empty())
    }

    /// Returns the external resources when present and non-empty.
    pub fn resources(&self) -> Option<&[ExternalResource]> {
        self.external_resources
            .as_deref()
            .filter(|resources| !resources.is_empty())
    }

    /// Returns the oil notes unless both fields are blank.
    pub fn oil(&self) -> Option<&HerbalOil> {
        self.herbal_oil
            .as_ref()
            .filter(|oil| !oil.lore.trim().is_empty() || !oil.usage.trim().is_empty())
    }
}

/// An herb saved into the grimoire together with its illustration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoriteRecord {
    #[serde(flatten)]
    pub herb: HerbRecord,
    /// Opaque image reference, usually a `data:` URI.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl FavoriteRecord {
    /// Creates an uncategorized favorite.
    pub fn new(herb: HerbRecord, image: impl Into<String>) -> Self {
        Self {
            herb,
            image: image.into(),
            category: None,
        }
    }

    /// Sets the category and returns the updated record.
    pub fn with_category(mut self, category: impl Into<Option<String>>) -> Self {
        self.category = category.into();
        self
    }

    /// Display name, which is also the identity of the record.
    pub fn name(&self) -> &str {
        &self.herb.name
    }

    /// Whether this record is identified by `name`.
    pub fn is_named(&self, name: &str) -> bool {
        names_match(&self.herb.name, name)
    }
}

/// A hand-authored spell referencing herbs by name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spell {
    pub id: String,
    pub name: String,
    pub ingredients: Vec<String>,
    pub instructions: String,
}

impl Spell {
    /// Whether the spell lists `herb_name` among its ingredients.
    pub fn uses(&self, herb_name: &str) -> bool {
        self.ingredients
            .iter()
            .any(|ingredient| names_match(ingredient, herb_name))
    }
}

/// Returns the spells that use the given herb, preserving their order.
pub fn spells_for<'a>(spells: &'a [Spell], herb_name: &str) -> Vec<&'a Spell> {
    spells.iter().filter(|spell| spell.uses(herb_name)).collect()
}

/// User-defined categories in creation order.
///
/// Names are unique case-insensitively; the list only exposes mutations that keep that
/// invariant and report a collision through `false`/`None` results.
///
/// Deserialization goes through [`CategoryList::from_names`], so a hand-edited store cannot
/// smuggle in duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CategoryList {
    names: Vec<String>,
}

impl From<Vec<String>> for CategoryList {
    fn from(names: Vec<String>) -> Self {
        Self::from_names(names)
    }
}

impl From<CategoryList> for Vec<String> {
    fn from(list: CategoryList) -> Self {
        list.names
    }
}

impl CategoryList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a list from names, skipping blanks and case-insensitive duplicates.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::new();
        for name in names {
            list.insert(name);
        }
        list
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the canonical spelling of `name` if the category exists.
    pub fn find(&self, name: &str) -> Option<&str> {
        self.names
            .iter()
            .find(|existing| names_match(existing, name))
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Appends a category; returns `false` for blank names and collisions.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into().trim().to_string();
        if name.is_empty() || self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    /// Renames `from` to `to` in place; fails when `to` names a different existing category.
    ///
    /// Returns the previous canonical name on success.
    pub fn rename(&mut self, from: &str, to: &str) -> Option<String> {
        let to = to.trim();
        if to.is_empty() {
            return None;
        }
        let index = self.names.iter().position(|name| names_match(name, from))?;
        let collides = self
            .names
            .iter()
            .enumerate()
            .any(|(other, name)| other != index && names_match(name, to));
        if collides {
            return None;
        }
        Some(std::mem::replace(&mut self.names[index], to.to_string()))
    }

    /// Removes a category and returns its canonical name.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self.names.iter().position(|existing| names_match(existing, name))?;
        Some(self.names.remove(index))
    }

    /// Names sorted for display.
    pub fn sorted(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        names.sort_by(|a, b| compare_display_names(a, b));
        names
    }
}

/// Where a favorite lands when grouped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryKey<'a> {
    Uncategorized,
    Named(&'a str),
}

/// Resolves a favorite's category against the current list.
///
/// An absent category, or one that no longer exists, resolves to [`CategoryKey::Uncategorized`].
/// This is the only place that rule lives.
pub fn resolve_category<'a>(
    favorite: &FavoriteRecord,
    categories: &'a CategoryList,
) -> CategoryKey<'a> {
    favorite
        .category
        .as_deref()
        .and_then(|name| categories.find(name))
        .map_or(CategoryKey::Uncategorized, CategoryKey::Named)
}

/// Order in which named categories follow the uncategorized group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CategoryOrder {
    #[default]
    Alphabetical,
    Creation,
}

/// A category together with the favorites that belong to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Chapter<'a> {
    title: String,
    uncategorized: bool,
    records: Vec<&'a FavoriteRecord>,
}

impl<'a> Chapter<'a> {
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_uncategorized(&self) -> bool {
        self.uncategorized
    }

    pub fn records(&self) -> &[&'a FavoriteRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Groups favorites by category.
///
/// The result always starts with the uncategorized group, followed by every category of the
/// list (including empty ones) in the requested order.  Records within a group are sorted by
/// display name.  Use [`non_empty_chapters`] to obtain the groups that are actually laid out.
pub fn group_favorites<'a>(
    favorites: &'a [FavoriteRecord],
    categories: &CategoryList,
    order: CategoryOrder,
) -> Vec<Chapter<'a>> {
    let named: Vec<&str> = match order {
        CategoryOrder::Alphabetical => categories.sorted(),
        CategoryOrder::Creation => categories.names().iter().map(String::as_str).collect(),
    };

    let mut chapters = Vec::with_capacity(named.len() + 1);
    chapters.push(Chapter {
        title: UNCATEGORIZED.to_string(),
        uncategorized: true,
        records: Vec::new(),
    });
    chapters.extend(named.iter().map(|name| Chapter {
        title: (*name).to_string(),
        uncategorized: false,
        records: Vec::new(),
    }));

    for favorite in favorites {
        let slot = match resolve_category(favorite, categories) {
            CategoryKey::Uncategorized => Some(0),
            CategoryKey::Named(name) => chapters
                .iter()
                .position(|chapter| !chapter.uncategorized && chapter.title == name),
        };
        if let Some(index) = slot {
            chapters[index].records.push(favorite);
        }
    }

    for chapter in &mut chapters {
        chapter
            .records
            .sort_by(|a, b| compare_display_names(a.name(), b.name()));
    }

    chapters
}

/// Groups favorites and drops the groups that have no records.
pub fn non_empty_chapters<'a>(
    favorites: &'a [FavoriteRecord],
    categories: &CategoryList,
    order: CategoryOrder,
) -> Vec<Chapter<'a>> {
    group_favorites(favorites, categories, order)
        .into_iter()
        .filter(|chapter| !chapter.is_empty())
        .collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn herb(name: &str) -> HerbRecord {
        HerbRecord {
            name: name.to_string(),
            scientific_name: format!("{} officinalis", name),
            magical_properties: vec!["Protection".to_string(), "Wisdom".to_string()],
            elemental_association: "Air".to_string(),
            planetary_association: "Jupiter".to_string(),
            deity_association: None,
            lore: format!("{} was burned at thresholds.", name),
            usage: format!("Hang {} above the door.", name),
            herbal_oil: None,
            complementary_essences: None,
            external_resources: None,
        }
    }

    pub fn favorite(name: &str, category: Option<&str>) -> FavoriteRecord {
        FavoriteRecord::new(herb(name), format!("data:image/png;base64,{}", name))
            .with_category(category.map(str::to_string))
    }
}
