//! Mapping from mini-language field names to trusted SQL columns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Lookup the compiler consults for every field name it meets.
///
/// Implementations must be pure and case-sensitive. Column identifiers are
/// inserted into SQL verbatim, so they have to come from a trusted schema and
/// never from the request.
pub trait FieldResolver {
    /// The column behind a mini-language name.
    fn resolve(&self, name: &str) -> Option<&str>;

    /// Every column, in the resolver's canonical order. Used when the select
    /// block is empty.
    fn columns(&self) -> Vec<&str>;

    /// Column used to sort when only a sort order is given.
    fn primary_column(&self) -> &str;
}

/// A [`FieldResolver`] backed by an ordered map; names iterate
/// lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default = "default_primary_key")]
    primary_key: String,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl Default for FieldMap {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldMap {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            primary_key: default_primary_key(),
        }
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    /// Adds a field, returning the column it previously mapped to.
    pub fn insert(&mut self, name: impl Into<String>, column: impl Into<String>) -> Option<String> {
        self.fields.insert(name.into(), column.into())
    }

    /// Flattens an embedded model's fields into this one. On a name collision
    /// the merged model wins.
    pub fn merge(&mut self, embedded: &FieldMap) {
        for (name, column) in &embedded.fields {
            self.fields.insert(name.clone(), column.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (name, column) in iter {
            map.insert(name, column);
        }
        map
    }
}

impl FieldResolver for FieldMap {
    fn resolve(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    fn columns(&self) -> Vec<&str> {
        self.fields.values().map(String::as_str).collect()
    }

    fn primary_column(&self) -> &str {
        &self.primary_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_map() -> FieldMap {
        [("ID", "id"), ("content", "content"), ("count", "count"), ("isBool", "is_bool")]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let map = test_map();
        assert_eq!(map.resolve("ID"), Some("id"));
        assert_eq!(map.resolve("id"), None);
        assert_eq!(map.resolve("isBool"), Some("is_bool"));
    }

    #[test]
    fn test_columns_follow_name_order() {
        assert_eq!(test_map().columns(), vec!["id", "content", "count", "is_bool"]);
    }

    #[test]
    fn test_merge_embedded_last_wins() {
        let mut map = test_map();
        let embedded: FieldMap = [("author", "author_name"), ("count", "nested_count")]
            .into_iter()
            .collect();
        map.merge(&embedded);
        assert_eq!(map.resolve("author"), Some("author_name"));
        assert_eq!(map.resolve("count"), Some("nested_count"));
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn test_primary_key() {
        assert_eq!(test_map().primary_column(), "id");
        assert_eq!(test_map().with_primary_key("uid").primary_column(), "uid");
    }

    #[test]
    fn test_deserialize_defaults_primary_key() {
        let map: FieldMap = serde_json::from_str(r#"{"fields": {"ID": "id"}}"#).unwrap();
        assert_eq!(map.primary_column(), "id");
        assert_eq!(map.resolve("ID"), Some("id"));
    }
}
