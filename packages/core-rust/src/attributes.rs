//! Ordered name/value collections used for call attributes and path parameters.

use serde::{Deserialize, Serialize};

use crate::serializer::Document;

/// A single named value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    pub name: String,
    pub value: Document,
}

impl Attribute {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Document>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered collection of [`Attribute`]s with unique names.
///
/// Serializes as a plain array (`[{"name": .., "value": ..}]`). When an
/// incoming array repeats a name, the first occurrence is kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Attribute>", into = "Vec<Attribute>")]
pub struct Attributes {
    entries: Vec<Attribute>,
}

impl Attributes {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Document> {
        self.position(name).map(|i| &self.entries[i].value)
    }

    /// Sets `name` to `value`, updating in place if present, else appending.
    ///
    /// Returns the previous value, if any.
    pub fn upsert(&mut self, name: impl Into<String>, value: impl Into<Document>) -> Option<Document> {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.entries[i].value, value)),
            None => {
                self.entries.push(Attribute { name, value });
                None
            }
        }
    }

    /// Appends `name` only if it is not already present. Returns whether it was added.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<Document>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.entries.push(Attribute {
            name,
            value: value.into(),
        });
        true
    }

    /// Merges `other` into `self` without overriding names already present.
    pub fn merge_absent(&mut self, other: &Attributes) {
        for attribute in &other.entries {
            self.insert_if_absent(attribute.name.clone(), attribute.value.clone());
        }
    }

    /// Removes `name`, preserving the order of the remaining entries.
    pub fn remove(&mut self, name: &str) -> Option<Document> {
        self.position(name).map(|i| self.entries.remove(i).value)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Attribute> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|a| a.name.as_str())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|a| a.name == name)
    }
}

impl From<Vec<Attribute>> for Attributes {
    fn from(entries: Vec<Attribute>) -> Self {
        let mut attributes = Self::new();
        for Attribute { name, value } in entries {
            attributes.insert_if_absent(name, value);
        }
        attributes
    }
}

impl From<Attributes> for Vec<Attribute> {
    fn from(attributes: Attributes) -> Self {
        attributes.entries
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<Document>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut attributes = Self::new();
        for (name, value) in iter {
            attributes.upsert(name, value);
        }
        attributes
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = &'a Attribute;
    type IntoIter = std::slice::Iter<'a, Attribute>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn upsert_updates_in_place_and_keeps_order() {
        let mut attrs = Attributes::new();
        attrs.upsert("a", 1);
        attrs.upsert("b", 2);
        let previous = attrs.upsert("a", 10);

        assert_eq!(previous, Some(json!(1)));
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(attrs.get("a"), Some(&json!(10)));
    }

    #[test]
    fn merge_absent_is_first_write_wins() {
        let mut attrs: Attributes = [("userId", "original")].into_iter().collect();
        let custom: Attributes = [("userId", "u1"), ("role", "admin")].into_iter().collect();

        attrs.merge_absent(&custom);

        assert_eq!(attrs.get("userId"), Some(&json!("original")));
        assert_eq!(attrs.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn remove_preserves_remaining_order() {
        let mut attrs: Attributes = [("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(attrs.remove("b"), Some(json!(2)));
        assert_eq!(attrs.remove("b"), None);
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn wire_form_is_a_name_value_array() {
        let attrs: Attributes = [("tenant", "acme")].into_iter().collect();
        let value = serde_json::to_value(&attrs).unwrap();
        assert_eq!(value, json!([{ "name": "tenant", "value": "acme" }]));
    }

    #[test]
    fn duplicate_names_on_the_wire_keep_the_first() {
        let attrs: Attributes = serde_json::from_value(json!([
            { "name": "k", "value": "first" },
            { "name": "k", "value": "second" }
        ]))
        .unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs.get("k"), Some(&json!("first")));
    }

    proptest! {
        #[test]
        fn names_stay_unique_under_upsert(ops in proptest::collection::vec(("[a-d]", 0i64..100), 0..40)) {
            let mut attrs = Attributes::new();
            for (name, value) in &ops {
                attrs.upsert(name.clone(), *value);
            }
            let mut names: Vec<_> = attrs.names().collect();
            let total = names.len();
            names.sort_unstable();
            names.dedup();
            prop_assert_eq!(names.len(), total);

            for (name, _) in &ops {
                let last = ops.iter().rev().find(|(n, _)| n == name).map(|(_, v)| json!(v));
                prop_assert_eq!(attrs.get(name).cloned(), last);
            }
        }
    }
}
