//! Side-channel metadata attached to a result: pagination and per-item provenance.

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::characters::Characters;
use crate::serializer::Document;

/// Provenance for one item of a result payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metavalue {
    pub value_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_characters: Option<Characters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_characters: Option<Characters>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Metavalue {
    #[must_use]
    pub fn new(value_id: impl Into<String>) -> Self {
        Self {
            value_id: value_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_data_tenant(mut self, data_tenant: impl Into<String>) -> Self {
        self.data_tenant = Some(data_tenant.into());
        self
    }

    #[must_use]
    pub fn with_initial_characters(mut self, characters: Characters) -> Self {
        self.initial_characters = Some(characters);
        self
    }

    #[must_use]
    pub fn with_current_characters(mut self, characters: Characters) -> Self {
        self.current_characters = Some(characters);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Document>) -> Self {
        self.attributes.upsert(name, value);
        self
    }
}

/// Result-level metadata.
///
/// `values` is a list, not a map: duplicate `value_id`s are accepted and a
/// lookup returns the first one in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metavalues {
    #[serde(default)]
    pub has_more_values: bool,
    #[serde(default)]
    pub values: Vec<Metavalue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value_count: Option<u64>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl Metavalues {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_more_values(mut self, has_more_values: bool) -> Self {
        self.has_more_values = has_more_values;
        self
    }

    #[must_use]
    pub fn with_total_count(mut self, total_value_count: u64) -> Self {
        self.total_value_count = Some(total_value_count);
        self
    }

    pub fn push(&mut self, value: Metavalue) -> &mut Self {
        self.values.push(value);
        self
    }

    #[must_use]
    pub fn get_meta_value(&self, value_id: &str) -> Option<&Metavalue> {
        self.values.iter().find(|v| v.value_id == value_id)
    }

    #[must_use]
    pub fn has_meta_value(&self, value_id: &str) -> bool {
        self.get_meta_value(value_id).is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.has_more_values
            && self.values.is_empty()
            && self.total_value_count.is_none()
            && self.attributes.is_empty()
    }
}

impl Extend<Metavalue> for Metavalues {
    fn extend<I: IntoIterator<Item = Metavalue>>(&mut self, iter: I) {
        self.values.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::characters::Identifier;

    #[test]
    fn lookup_returns_first_duplicate() {
        let mut meta = Metavalues::new();
        meta.push(Metavalue::new("a").with_data_tenant("first"))
            .push(Metavalue::new("b"))
            .push(Metavalue::new("a").with_data_tenant("second"));

        assert_eq!(meta.values.len(), 3);
        assert_eq!(
            meta.get_meta_value("a").and_then(|v| v.data_tenant.as_deref()),
            Some("first")
        );
        assert!(meta.has_meta_value("b"));
        assert!(!meta.has_meta_value("c"));
    }

    #[test]
    fn wire_shape_matches_response_meta() {
        let mut meta = Metavalues::new().with_more_values(true).with_total_count(40);
        meta.push(
            Metavalue::new("item-1")
                .with_current_characters(Characters::default().with_subject(Identifier::new("user", "9"))),
        );

        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(
            value,
            json!({
                "hasMoreValues": true,
                "values": [{
                    "valueId": "item-1",
                    "currentCharacters": { "subject": { "type": "user", "id": "9" } },
                    "attributes": []
                }],
                "totalValueCount": 40,
                "attributes": []
            })
        );
    }

    #[test]
    fn missing_fields_default_on_read() {
        let meta: Metavalues = serde_json::from_value(json!({})).unwrap();
        assert!(meta.is_empty());
    }
}
