//! Per-call state: locale, tenant, identities, attributes and the transaction id.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::Attributes;
use crate::characters::Characters;

/// Correlates one logical call across inbound and outbound boundaries.
///
/// Serialized as its hyphenated UUID text, so a textual attribute value
/// deserializes straight into a `TransactionId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Call context owned by a client or a transport context.
///
/// Cloning is a full structural copy; no collection is shared between a value
/// and anything derived from it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallInformation {
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub data_tenant: String,
    #[serde(default)]
    pub characters: Characters,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub path_params: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl CallInformation {
    /// Creates call state with a fresh transaction id.
    #[must_use]
    pub fn new(locale: impl Into<String>, data_tenant: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            data_tenant: data_tenant.into(),
            transaction_id: Some(TransactionId::new()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// Returns the transaction id, assigning a fresh one if unset.
    pub fn ensure_transaction_id(&mut self) -> TransactionId {
        *self.transaction_id.get_or_insert_with(TransactionId::new)
    }
}
