//! Ordered-insertion property multimap.

use serde::{Deserialize, Serialize};

use crate::atom::{Atom, Uri};

/// A multimap from predicate to [`Atom`], preserving insertion order.
///
/// Duplicate predicates are allowed, and so are duplicate (predicate, value)
/// pairs. Lookups are linear; objects carry a handful of properties.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    entries: Vec<(Uri, Atom)>,
}

impl Properties {
    /// Creates an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, predicate: impl Into<Uri>, value: impl Into<Atom>) -> Self {
        self.insert(predicate, value);
        self
    }

    /// Appends a value; existing values for the predicate are kept.
    pub fn insert(&mut self, predicate: impl Into<Uri>, value: impl Into<Atom>) {
        self.entries.push((predicate.into(), value.into()));
    }

    /// Replaces every value of `predicate` with `value`.
    ///
    /// The new entry takes the position of the first removed one, so
    /// overwriting a property does not reorder the set.
    pub fn set(&mut self, predicate: impl Into<Uri>, value: impl Into<Atom>) {
        let predicate = predicate.into();
        let value = value.into();
        match self.entries.iter().position(|(p, _)| *p == predicate) {
            Some(first) => {
                self.entries[first].1 = value;
                let mut idx = 0;
                self.entries.retain(|(p, _)| {
                    let keep = idx <= first || *p != predicate;
                    idx += 1;
                    keep
                });
            }
            None => self.entries.push((predicate, value)),
        }
    }

    /// First value of `predicate`.
    pub fn get(&self, predicate: &str) -> Option<&Atom> {
        self.entries
            .iter()
            .find(|(p, _)| p == predicate)
            .map(|(_, v)| v)
    }

    /// Every value of `predicate`, in insertion order.
    pub fn get_all<'a>(&'a self, predicate: &'a str) -> impl Iterator<Item = &'a Atom> + 'a {
        self.entries
            .iter()
            .filter(move |(p, _)| p == predicate)
            .map(|(_, v)| v)
    }

    /// Whether any value exists for `predicate`.
    pub fn contains(&self, predicate: &str) -> bool {
        self.get(predicate).is_some()
    }

    /// Removes every (predicate, value) entry equal to the given pair.
    /// The wildcard atom removes every value of the predicate.
    pub fn remove(&mut self, predicate: &Uri, value: &Atom) {
        if value.is_wildcard() {
            self.remove_all(predicate.as_str());
        } else {
            self.entries.retain(|(p, v)| !(p == predicate && v == value));
        }
    }

    /// Removes every value of `predicate`.
    pub fn remove_all(&mut self, predicate: &str) {
        self.entries.retain(|(p, _)| p != predicate);
    }

    /// Applies a delta: first every entry of `remove`, then every entry of `add`.
    pub fn apply(&mut self, remove: &Properties, add: &Properties) {
        for (p, v) in remove.iter() {
            self.remove(p, v);
        }
        for (p, v) in add.iter() {
            self.entries.push((p.clone(), v.clone()));
        }
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Uri, &Atom)> {
        self.entries.iter().map(|(p, v)| (p, v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(Uri, Atom)> for Properties {
    fn from_iter<I: IntoIterator<Item = (Uri, Atom)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
