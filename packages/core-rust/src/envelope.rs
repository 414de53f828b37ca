//! Wire shapes exchanged across a transport boundary.

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::call::{CallInformation, TransactionId};
use crate::characters::Characters;
use crate::error::TransportError;
use crate::meta::Metavalues;
use crate::operation::{OperationInformation, OperationType};
use crate::serializer::Document;

/// A request as it travels between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    pub operation_id: String,
    pub operation_verb: String,
    pub operation_type: OperationType,
    #[serde(default)]
    pub calling_client: String,
    #[serde(default)]
    pub usage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(default)]
    pub data_tenant: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub characters: Characters,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub path_params: Attributes,
    #[serde(default)]
    pub request_payload: Document,
}

impl RequestEnvelope {
    /// Flattens an operation, its call state and its payload into one envelope.
    #[must_use]
    pub fn from_parts(operation: &OperationInformation, call: &CallInformation, payload: Document) -> Self {
        Self {
            operation_id: operation.id.clone(),
            operation_verb: operation.verb.clone(),
            operation_type: operation.operation_type,
            calling_client: operation.calling_client.clone(),
            usage_id: operation.usage_id.clone(),
            transaction_id: call.transaction_id,
            data_tenant: call.data_tenant.clone(),
            locale: call.locale.clone(),
            characters: call.characters.clone(),
            attributes: call.attributes.clone(),
            path_params: call.path_params.clone(),
            request_payload: payload,
        }
    }

    #[must_use]
    pub fn into_parts(self) -> (OperationInformation, CallInformation, Document) {
        let operation = OperationInformation {
            id: self.operation_id,
            verb: self.operation_verb,
            operation_type: self.operation_type,
            calling_client: self.calling_client,
            usage_id: self.usage_id,
        };
        let call = CallInformation {
            locale: self.locale,
            data_tenant: self.data_tenant,
            characters: self.characters,
            attributes: self.attributes,
            path_params: self.path_params,
            transaction_id: self.transaction_id,
        };
        (operation, call, self.request_payload)
    }
}

/// A result as it travels between sessions.
///
/// `status_code` and `success` are optional on read; see
/// [`TransportResult::from_envelope`](crate::TransportResult::from_envelope)
/// for how missing fields are derived.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    #[serde(default)]
    pub value: Option<Document>,
    #[serde(default)]
    pub status_code: Option<u16>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub meta: Metavalues,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TransportError>,
}
