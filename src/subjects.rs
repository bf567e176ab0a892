//! The subject list: which page titles are in scope, and which category each belongs to.

use std::{fs::File, io::Read, path::Path};

use compact_str::CompactString;
use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Category assigned to subjects whose list entry carries none.
pub const DEFAULT_CATEGORY: &str = "Other";

/// Verdict of a [`PageFilter`] on one title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Retain { category: Option<CompactString> },
    Discard,
}

/// Decides, from the title alone, whether a page is worth materializing.
pub trait PageFilter: Sync {
    fn admit(&self, title: &str) -> Admission;
}

/// Retains every page without a category.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl PageFilter for AcceptAll {
    fn admit(&self, _title: &str) -> Admission {
        Admission::Retain { category: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubjectListError {
    #[error("failed to read subject list")]
    Io(#[from] std::io::Error),
    #[error("malformed subject list")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Deserialize)]
struct SubjectEntry {
    wikipedia_title: CompactString,
    #[serde(default)]
    party_group: Option<CompactString>,
}

/// Exact-match title set with one category per title. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct SubjectList {
    categories: FxHashMap<CompactString, CompactString>,
}

impl SubjectList {
    /// Load from CSV with a `wikipedia_title` column and an optional `party_group` column.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, SubjectListError> {
        let mut reader = csv::Reader::from_reader(reader);
        let mut list = SubjectList::default();
        let mut skipped = 0usize;

        for entry in reader.deserialize() {
            let entry: SubjectEntry = entry?;
            let title = entry.wikipedia_title.trim();
            if title.is_empty() {
                skipped += 1;
                continue;
            }
            list.insert(title, entry.party_group.as_deref());
        }

        if skipped > 0 {
            tracing::warn!(message = "Skipped subject list entries without title", skipped);
        }
        tracing::debug!(subjects = list.len(), "loaded subject list");
        Ok(list)
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, SubjectListError> {
        Self::from_csv_reader(File::open(path)?)
    }

    pub fn from_pairs<T, C>(pairs: impl IntoIterator<Item = (T, C)>) -> Self
    where
        T: AsRef<str>,
        C: AsRef<str>,
    {
        let mut list = SubjectList::default();
        for (title, category) in pairs {
            list.insert(title.as_ref(), Some(category.as_ref()));
        }
        list
    }

    // first non-default category wins for duplicate titles
    fn insert(&mut self, title: &str, category: Option<&str>) {
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);

        match self.categories.get_mut(title) {
            Some(existing) if existing == DEFAULT_CATEGORY => {
                *existing = CompactString::from(category);
            }
            Some(_) => {}
            None => {
                self.categories
                    .insert(CompactString::from(title), CompactString::from(category));
            }
        }
    }

    pub fn contains(&self, title: &str) -> bool {
        self.categories.contains_key(title)
    }

    pub fn category(&self, title: &str) -> Option<&str> {
        self.categories.get(title).map(CompactString::as_str)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

impl PageFilter for SubjectList {
    fn admit(&self, title: &str) -> Admission {
        match self.categories.get(title) {
            Some(category) => Admission::Retain {
                category: Some(category.clone()),
            },
            None => Admission::Discard,
        }
    }
}
