//! Operation identity and call descriptors.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::serializer::Document;

/// Whether the caller expects a typed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// Expects a typed response.
    Request,
    /// Fire-and-forget; the declared response type is `()`.
    Message,
}

/// Immutable identity of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationInformation {
    /// Globally unique operation identifier, e.g. `"catalog.items.get"`.
    pub id: String,
    /// Semantic data-processing verb (not an HTTP method).
    pub verb: String,
    pub operation_type: OperationType,
    /// Logical name of the invoker.
    #[serde(default)]
    pub calling_client: String,
    /// Caller-supplied correlation/usage label.
    #[serde(default)]
    pub usage_id: String,
}

impl OperationInformation {
    #[must_use]
    pub fn new(id: impl Into<String>, verb: impl Into<String>, operation_type: OperationType) -> Self {
        Self {
            id: id.into(),
            verb: verb.into(),
            operation_type,
            calling_client: String::new(),
            usage_id: String::new(),
        }
    }

    #[must_use]
    pub fn with_calling_client(mut self, calling_client: impl Into<String>) -> Self {
        self.calling_client = calling_client.into();
        self
    }

    #[must_use]
    pub fn with_usage_id(mut self, usage_id: impl Into<String>) -> Self {
        self.usage_id = usage_id.into();
        self
    }

    #[must_use]
    pub fn is_message(&self) -> bool {
        self.operation_type == OperationType::Message
    }
}

/// A statically typed call: request payload `Req`, declared response `Resp`.
#[derive(Debug, Clone)]
pub struct OperationCall<Req, Resp = Document> {
    pub id: String,
    pub verb: String,
    pub operation_type: OperationType,
    pub payload: Req,
    pub path_params: Attributes,
    response: PhantomData<fn() -> Resp>,
}

impl<Req, Resp> OperationCall<Req, Resp> {
    /// A request-type call expecting a `Resp`.
    pub fn request(id: impl Into<String>, verb: impl Into<String>, payload: Req) -> Self {
        Self {
            id: id.into(),
            verb: verb.into(),
            operation_type: OperationType::Request,
            payload,
            path_params: Attributes::new(),
            response: PhantomData,
        }
    }

    #[must_use]
    pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<Document>) -> Self {
        self.path_params.upsert(name, value);
        self
    }
}

impl<Req> OperationCall<Req, ()> {
    /// A fire-and-forget call.
    pub fn message(id: impl Into<String>, verb: impl Into<String>, payload: Req) -> Self {
        Self {
            id: id.into(),
            verb: verb.into(),
            operation_type: OperationType::Message,
            payload,
            path_params: Attributes::new(),
            response: PhantomData,
        }
    }
}

/// An operation described as data, e.g. one entry of an agent-emitted batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericOperation {
    pub id: String,
    pub verb: String,
    pub operation_type: OperationType,
    #[serde(default)]
    pub payload: Document,
    #[serde(default)]
    pub path_params: Attributes,
}
