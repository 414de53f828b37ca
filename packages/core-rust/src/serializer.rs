//! Serializer capability.
//!
//! The runtime never assumes a concrete codec. A [`Serializer`] turns text into
//! a generic [`Document`] tree and back; typed conversion between a `Document`
//! and a Rust value goes through serde. Wire types in this crate use
//! `#[serde(rename_all = "camelCase")]`, so keys start with a lowercase letter
//! whichever codec is plugged in.
//!
//! A process-wide default ([`default_serializer`]) exists for the one place
//! that needs a codec without one being bound: [`TransportResult::convert`]
//! on a result that was never tagged.
//!
//! [`TransportResult::convert`]: crate::result::TransportResult::convert

use std::any::type_name;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Codec-neutral intermediate representation of a serialized value.
pub type Document = serde_json::Value;

/// Errors raised while moving values through a [`Serializer`].
#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    /// A result or request was (de)serialized before a serializer was bound to it.
    #[error("no serializer is bound to this value")]
    NotBound,
    /// The value could not be turned into a document or text.
    #[error("failed to encode {type_name}: {message}")]
    Encode {
        type_name: &'static str,
        message: String,
    },
    /// The text or document could not be read as the requested type.
    #[error("failed to decode {type_name}: {message}")]
    Decode {
        type_name: &'static str,
        message: String,
    },
    /// [`set_default_serializer`] was called after the default was fixed.
    #[error("the default serializer has already been initialized")]
    DefaultAlreadySet,
}

/// Two-method codec contract: text to [`Document`] and back.
///
/// The trait is object safe so sessions, contexts and results can share a
/// single `Arc<dyn Serializer>`. Typed helpers live on `dyn Serializer`.
pub trait Serializer: Send + Sync + fmt::Debug {
    /// Short codec name used in logs.
    fn name(&self) -> &'static str;

    /// Renders a document as text.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Encode`] if the codec cannot represent the document.
    fn encode(&self, document: &Document) -> Result<String, SerializationError>;

    /// Parses text into a document.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Decode`] if the text is malformed.
    fn decode(&self, text: &str) -> Result<Document, SerializationError>;
}

impl<'a> dyn Serializer + 'a {
    /// Converts a typed value into a document.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Encode`] if `value`'s `Serialize` impl fails.
    pub fn to_document<T: Serialize + ?Sized>(
        &self,
        value: &T,
    ) -> Result<Document, SerializationError> {
        serde_json::to_value(value).map_err(|e| SerializationError::Encode {
            type_name: type_name::<T>(),
            message: e.to_string(),
        })
    }

    /// Materializes a document as a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Decode`] if the document does not fit `T`.
    pub fn from_document<T: DeserializeOwned>(
        &self,
        document: Document,
    ) -> Result<T, SerializationError> {
        serde_json::from_value(document).map_err(|e| SerializationError::Decode {
            type_name: type_name::<T>(),
            message: e.to_string(),
        })
    }

    /// Serializes a typed value to text.
    ///
    /// # Errors
    ///
    /// Propagates encode failures from either stage.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, SerializationError> {
        let document = self.to_document(value)?;
        self.encode(&document)
    }

    /// Deserializes text into a typed value.
    ///
    /// # Errors
    ///
    /// Propagates decode failures from either stage.
    pub fn deserialize<T: DeserializeOwned>(&self, text: &str) -> Result<T, SerializationError> {
        let document = self.decode(text)?;
        self.from_document(document)
    }
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer {
    pretty: bool,
}

impl JsonSerializer {
    /// Compact JSON output.
    #[must_use]
    pub fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON output, for logs and fixtures.
    #[must_use]
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, document: &Document) -> Result<String, SerializationError> {
        let encoded = if self.pretty {
            serde_json::to_string_pretty(document)
        } else {
            serde_json::to_string(document)
        };
        encoded.map_err(|e| SerializationError::Encode {
            type_name: type_name::<Document>(),
            message: e.to_string(),
        })
    }

    fn decode(&self, text: &str) -> Result<Document, SerializationError> {
        serde_json::from_str(text).map_err(|e| SerializationError::Decode {
            type_name: type_name::<Document>(),
            message: e.to_string(),
        })
    }
}

static DEFAULT_SERIALIZER: OnceLock<Arc<dyn Serializer>> = OnceLock::new();

/// Returns the process-wide fallback serializer (JSON unless replaced at startup).
#[must_use]
pub fn default_serializer() -> Arc<dyn Serializer> {
    Arc::clone(DEFAULT_SERIALIZER.get_or_init(|| Arc::new(JsonSerializer::new())))
}

/// Replaces the process-wide fallback serializer.
///
/// Must run before anything reads the default.
///
/// # Errors
///
/// Returns [`SerializationError::DefaultAlreadySet`] once the default has been
/// set or read.
pub fn set_default_serializer(serializer: Arc<dyn Serializer>) -> Result<(), SerializationError> {
    DEFAULT_SERIALIZER
        .set(serializer)
        .map_err(|_| SerializationError::DefaultAlreadySet)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Item {
        item_id: u32,
        display_name: String,
    }

    fn json() -> Arc<dyn Serializer> {
        Arc::new(JsonSerializer::new())
    }

    #[test]
    fn typed_values_use_lower_camel_keys() {
        let text = json()
            .serialize(&Item {
                item_id: 7,
                display_name: "seven".to_string(),
            })
            .unwrap();
        assert_eq!(text, r#"{"itemId":7,"displayName":"seven"}"#);
    }

    #[test]
    fn document_materializes_into_typed_value() {
        let item: Item = json()
            .from_document(json!({ "itemId": 3, "displayName": "three" }))
            .unwrap();
        assert_eq!(item.item_id, 3);
    }

    #[test]
    fn decode_error_names_the_target_type() {
        let err = json().deserialize::<Item>("{\"itemId\":\"x\"}").unwrap_err();
        match err {
            SerializationError::Decode { type_name, .. } => assert!(type_name.ends_with("Item")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_text_is_a_decode_error() {
        assert!(matches!(
            json().decode("{not json"),
            Err(SerializationError::Decode { .. })
        ));
    }

    #[test]
    fn pretty_output_is_indented() {
        let pretty: Arc<dyn Serializer> = Arc::new(JsonSerializer::pretty());
        let text = pretty.serialize(&json!({ "a": 1 })).unwrap();
        assert!(text.contains('\n'));
    }

    #[test]
    fn default_cannot_be_replaced_after_first_read() {
        let first = default_serializer();
        assert_eq!(first.name(), "json");
        assert!(matches!(
            set_default_serializer(json()),
            Err(SerializationError::DefaultAlreadySet)
        ));
    }
}
