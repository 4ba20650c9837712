//! Field sets and the selectors callers use to describe them.

use std::collections::BTreeSet;

use serde::Deserialize;

/// Separator accepted between field names in a single selector string.
pub const FIELD_SEPARATOR: char = '|';

/// Selector value meaning "every field".
pub const ALL_FIELDS: &str = "*";

/// An owned set of field names.
///
/// Iteration order is sorted so that expanding a clause over a set always
/// produces the same tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet {
    names: BTreeSet<String>,
}

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        self.names.insert(name.into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Caller-facing description of a field set.
///
/// Deserializes from either a string (`"title"`, `"title|body"`, `"*"`) or
/// a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum FieldSelector {
    Joined(String),
    List(Vec<String>),
}

impl FieldSelector {
    /// Resolves the selector. `None` means unrestricted.
    ///
    /// Only a bare `"*"` string is the wildcard; a list is always taken
    /// literally, and empty names in a joined string are skipped.
    pub fn resolve(&self) -> Option<FieldSet> {
        match self {
            FieldSelector::Joined(raw) => {
                if raw.trim() == ALL_FIELDS {
                    return None;
                }
                Some(
                    raw.split(FIELD_SEPARATOR)
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .collect(),
                )
            }
            FieldSelector::List(names) => Some(names.iter().cloned().collect()),
        }
    }
}

impl From<&str> for FieldSelector {
    fn from(value: &str) -> Self {
        FieldSelector::Joined(value.to_string())
    }
}

impl From<String> for FieldSelector {
    fn from(value: String) -> Self {
        FieldSelector::Joined(value)
    }
}

impl From<Vec<String>> for FieldSelector {
    fn from(value: Vec<String>) -> Self {
        FieldSelector::List(value)
    }
}

impl From<&[&str]> for FieldSelector {
    fn from(value: &[&str]) -> Self {
        FieldSelector::List(value.iter().map(|name| name.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FieldSelector {
    fn from(value: [&str; N]) -> Self {
        FieldSelector::List(value.iter().map(|name| name.to_string()).collect())
    }
}
