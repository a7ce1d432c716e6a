//! Dataset records shared by every job.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::names::{MatchConfidence, MatchRules, classify_names_with};

/// A single bibliographic item attributed to a thinker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Set when the source page marks the work as recommended reading.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recommended: bool,
}

impl WorkRecord {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            ..Default::default()
        }
    }
}

/// A person tracked by the dataset.
///
/// Fields the tooling does not know about are kept in `extra` so that a
/// load/save round-trip never drops curated data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkerRecord {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bio_url: String,
    #[serde(default)]
    pub works: Vec<WorkRecord>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ThinkerRecord {
    pub fn has_image(&self) -> bool {
        !self.image_url.trim().is_empty()
    }

    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_url
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty())
    }
}

/// A string-keyed map that keeps insertion order through serde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping the original position of an existing key.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Value for `key`, inserting `V::default()` at the end if absent.
    pub fn entry_or_default(&mut self, key: &str) -> &mut V
    where
        V: Default,
    {
        let pos = match self.entries.iter().position(|(k, _)| k == key) {
            Some(pos) => pos,
            None => {
                self.entries.push((key.to_string(), V::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[pos].1
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut V)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = OrderedMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = OrderedMap<V>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = OrderedMap::new();
                while let Some((k, v)) = access.next_entry::<String, V>()? {
                    map.insert(k, v);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

/// Position of a thinker inside a [`CategoryIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThinkerLoc {
    pub category: usize,
    pub index: usize,
}

/// Category name → thinkers, in file order. This is the bundle file's shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryIndex {
    categories: OrderedMap<Vec<ThinkerRecord>>,
}

impl CategoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, category: impl Into<String>, thinkers: Vec<ThinkerRecord>) {
        self.categories.insert(category, thinkers);
    }

    /// Append a thinker, creating the category at the end if it is new.
    pub fn push(&mut self, category: &str, thinker: ThinkerRecord) -> ThinkerLoc {
        let thinkers = self.categories.entry_or_default(category);
        thinkers.push(thinker);
        let index = thinkers.len() - 1;
        let category = self
            .categories
            .keys()
            .position(|k| k == category)
            .unwrap_or_default();
        ThinkerLoc { category, index }
    }

    pub fn category(&self, name: &str) -> Option<&[ThinkerRecord]> {
        self.categories.get(name).map(Vec::as_slice)
    }

    pub fn categories(&self) -> impl Iterator<Item = (&str, &[ThinkerRecord])> {
        self.categories.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn thinker_count(&self) -> usize {
        self.categories.iter().map(|(_, v)| v.len()).sum()
    }

    /// Every thinker with its location and category name, in file order.
    pub fn locations(&self) -> impl Iterator<Item = (ThinkerLoc, &str, &ThinkerRecord)> {
        self.categories
            .iter()
            .enumerate()
            .flat_map(|(ci, (cat, thinkers))| {
                thinkers.iter().enumerate().map(move |(ti, t)| {
                    (
                        ThinkerLoc {
                            category: ci,
                            index: ti,
                        },
                        cat,
                        t,
                    )
                })
            })
    }

    pub fn get(&self, loc: ThinkerLoc) -> Option<&ThinkerRecord> {
        self.categories
            .entries
            .get(loc.category)
            .and_then(|(_, v)| v.get(loc.index))
    }

    pub fn get_mut(&mut self, loc: ThinkerLoc) -> Option<&mut ThinkerRecord> {
        self.categories
            .entries
            .get_mut(loc.category)
            .and_then(|(_, v)| v.get_mut(loc.index))
    }

    /// Find a thinker by name, searching `preferred` first and then every
    /// category. The strongest match wins; ties go to the earliest entry.
    pub fn locate(
        &self,
        name: &str,
        preferred: Option<&str>,
        rules: &MatchRules,
    ) -> Option<ThinkerLoc> {
        let strongest = |only: Option<&str>| {
            self.locations()
                .filter(|(_, cat, _)| only.is_none_or(|c| c == *cat))
                .filter_map(|(loc, _, t)| {
                    classify_names_with(&t.name, name, rules)
                        .filter(|c| c.is_strong())
                        .map(|c| (c, loc))
                })
                .min_by_key(|(c, _)| *c)
                .map(|(_, loc)| loc)
        };
        preferred
            .and_then(|p| strongest(Some(p)))
            .or_else(|| strongest(None))
    }
}

/// Compact per-thinker record consumed by the website.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompactMetadata {
    /// Name.
    pub n: String,
    /// Category.
    pub c: String,
    /// Description.
    pub d: String,
    /// Bio URL.
    pub b: String,
    /// Image URL.
    pub i: String,
    /// Thumbnail URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,
    /// Work count.
    pub w: usize,
    /// Major works.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub j: Option<Vec<WorkRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subjects: Option<Vec<SubjectCount>>,
}

impl CompactMetadata {
    pub fn from_thinker(thinker: &ThinkerRecord) -> Self {
        let major: Vec<WorkRecord> = thinker
            .works
            .iter()
            .filter(|w| w.recommended)
            .cloned()
            .collect();
        Self {
            n: thinker.name.clone(),
            c: thinker.category.clone(),
            d: thinker.description.clone(),
            b: thinker.bio_url.clone(),
            i: thinker.image_url.clone(),
            t: Some(thinker.thumbnail_url.clone().unwrap_or_default()),
            w: thinker.works.len(),
            j: (!major.is_empty()).then_some(major),
            subjects: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectCount {
    pub name: String,
    pub count: usize,
}

/// One anchor on the archive's author index page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorEntry {
    pub text: String,
    pub href: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
}

/// An author listed in a `span.author` index, with the category heading it sits under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorLink {
    pub name: String,
    pub href: String,
    pub category: String,
}

/// A thinker that currently has no works.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZeroWorksRecord {
    pub collection: String,
    pub thinker: String,
    pub slug: String,
}

/// Confidence tier of a [`SourceMatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Matched,
    LastNameMatch,
    #[default]
    Unmatched,
}

/// Candidate archive author pages for a dataset thinker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub collection: String,
    pub thinker: String,
    pub slug: String,
    #[serde(default)]
    pub matches: Vec<AuthorEntry>,
    #[serde(default)]
    pub status: MatchTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<MatchConfidence>,
    #[serde(default)]
    pub notes: Vec<String>,
}
