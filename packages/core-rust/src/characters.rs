//! The subject / responsible / performer identity triple attached to a call.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed identifier, e.g. `user:42` or `service:billing`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    /// Kind of entity. Serialized as `type`.
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

impl Identifier {
    #[must_use]
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Identities involved in a call. Every slot is optional.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characters {
    /// Entity the call is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Identifier>,
    /// Accountable party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsible: Option<Identifier>,
    /// Actor executing the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performer: Option<Identifier>,
}

impl Characters {
    #[must_use]
    pub fn has_subject(&self) -> bool {
        self.subject.is_some()
    }

    #[must_use]
    pub fn has_responsible(&self) -> bool {
        self.responsible.is_some()
    }

    #[must_use]
    pub fn has_performer(&self) -> bool {
        self.performer.is_some()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.has_subject() || self.has_responsible() || self.has_performer())
    }

    #[must_use]
    pub fn with_subject(mut self, subject: Identifier) -> Self {
        self.subject = Some(subject);
        self
    }

    #[must_use]
    pub fn with_responsible(mut self, responsible: Identifier) -> Self {
        self.responsible = Some(responsible);
        self
    }

    #[must_use]
    pub fn with_performer(mut self, performer: Identifier) -> Self {
        self.performer = Some(performer);
        self
    }
}
