// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client-side set-membership filter over projected items.
//!
//! A filter has named dimensions. Each dimension extracts one value from an
//! item and holds a set of selected values. An item passes when, for every
//! dimension with a non-empty selection, its value is in the selection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

type Extractor<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;

struct Dimension<T> {
    extract: Extractor<T>,
    selected: BTreeSet<String>,
}

impl<T> Clone for Dimension<T> {
    fn clone(&self) -> Self {
        Self {
            extract: self.extract.clone(),
            selected: self.selected.clone(),
        }
    }
}

/// Multi-dimension filter with AND across dimensions and OR within one.
pub struct ProjectionFilter<T> {
    dimensions: BTreeMap<String, Dimension<T>>,
}

impl<T> Clone for ProjectionFilter<T> {
    fn clone(&self) -> Self {
        Self {
            dimensions: self.dimensions.clone(),
        }
    }
}

impl<T> Default for ProjectionFilter<T> {
    fn default() -> Self {
        Self {
            dimensions: BTreeMap::new(),
        }
    }
}

impl<T> fmt::Debug for ProjectionFilter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, dim) in &self.dimensions {
            map.entry(name, &dim.selected);
        }
        map.finish()
    }
}

impl<T> ProjectionFilter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dimension with an empty selection.
    pub fn dimension(
        mut self,
        name: impl Into<String>,
        extract: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.dimensions.insert(
            name.into(),
            Dimension {
                extract: Arc::new(extract),
                selected: BTreeSet::new(),
            },
        );
        self
    }

    pub fn has_dimension(&self, name: &str) -> bool {
        self.dimensions.contains_key(name)
    }

    pub fn dimension_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions.keys().map(String::as_str)
    }

    /// Add a value to a dimension's selection.
    ///
    /// Returns `false` if the dimension is unknown.
    pub fn select(&mut self, name: &str, value: impl Into<String>) -> bool {
        match self.dimensions.get_mut(name) {
            Some(dim) => {
                dim.selected.insert(value.into());
                true
            }
            None => false,
        }
    }

    pub fn deselect(&mut self, name: &str, value: &str) -> bool {
        match self.dimensions.get_mut(name) {
            Some(dim) => dim.selected.remove(value),
            None => false,
        }
    }

    /// Flip a value in or out of the selection, returning whether it is now
    /// selected.
    pub fn toggle(&mut self, name: &str, value: &str) -> bool {
        let Some(dim) = self.dimensions.get_mut(name) else {
            return false;
        };
        if dim.selected.remove(value) {
            false
        } else {
            dim.selected.insert(value.to_string());
            true
        }
    }

    /// Empty one dimension's selection (no filtering on it).
    pub fn clear(&mut self, name: &str) {
        if let Some(dim) = self.dimensions.get_mut(name) {
            dim.selected.clear();
        }
    }

    pub fn clear_all(&mut self) {
        for dim in self.dimensions.values_mut() {
            dim.selected.clear();
        }
    }

    pub fn selected(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.dimensions.get(name).map(|d| &d.selected)
    }

    /// True when no dimension restricts anything.
    pub fn is_empty(&self) -> bool {
        self.dimensions.values().all(|d| d.selected.is_empty())
    }

    pub fn matches(&self, item: &T) -> bool {
        self.dimensions.values().all(|dim| {
            if dim.selected.is_empty() {
                return true;
            }
            match (dim.extract)(item) {
                Some(value) => dim.selected.contains(&value),
                None => false,
            }
        })
    }

    /// Keep matching items in their original order.
    pub fn apply(&self, items: &[T]) -> Vec<T>
    where
        T: Clone,
    {
        items.iter().filter(|i| self.matches(i)).cloned().collect()
    }
}
