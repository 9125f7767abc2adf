//! Ordered, name-keyed result collections for object queries.

use crate::types::ConfigObject;
use std::collections::HashMap;

/// Result of an object query: an ordered sequence plus a name-keyed map.
///
/// The original automation API exposed one duck-typed indexer accepting
/// either a 1-based position or a name. Both lookup forms are explicit
/// here: [`QuerySet::get`] is positional (0-based) over the query order,
/// [`QuerySet::by_name`] is keyed on tagname.
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    order: Vec<String>,
    by_name: HashMap<String, ConfigObject>,
}

impl QuerySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from objects, preserving their order.
    pub fn from_objects(objects: Vec<ConfigObject>) -> Self {
        let mut set = Self::new();
        for object in objects {
            set.push(object);
        }
        set
    }

    /// Append an object. A repeated tagname replaces the stored object
    /// and keeps its original position.
    pub fn push(&mut self, object: ConfigObject) {
        if !self.by_name.contains_key(&object.tagname) {
            self.order.push(object.tagname.clone());
        }
        self.by_name.insert(object.tagname.clone(), object);
    }

    /// Number of objects in the set.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if the set holds no objects.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Positional lookup, 0-based over the query order.
    pub fn get(&self, index: usize) -> Option<&ConfigObject> {
        self.order.get(index).and_then(|tagname| self.by_name.get(tagname))
    }

    /// Name-keyed lookup.
    pub fn by_name(&self, tagname: &str) -> Option<&ConfigObject> {
        self.by_name.get(tagname)
    }

    /// True if an object with this tagname is in the set.
    pub fn contains(&self, tagname: &str) -> bool {
        self.by_name.contains_key(tagname)
    }

    /// Tagnames in query order.
    pub fn tagnames(&self) -> &[String] {
        &self.order
    }

    /// Iterate objects in query order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigObject> {
        self.order.iter().filter_map(|tagname| self.by_name.get(tagname))
    }

    /// Consume the set into an ordered vector.
    pub fn into_vec(mut self) -> Vec<ConfigObject> {
        self.order
            .iter()
            .filter_map(|tagname| self.by_name.remove(tagname))
            .collect()
    }
}

impl FromIterator<ConfigObject> for QuerySet {
    fn from_iter<I: IntoIterator<Item = ConfigObject>>(iter: I) -> Self {
        let mut set = Self::new();
        for object in iter {
            set.push(object);
        }
        set
    }
}
