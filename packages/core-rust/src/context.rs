use std::any::type_name;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::attributes::Attributes;
use crate::call::{CallInformation, TransactionId};
use crate::operation::OperationInformation;
use crate::serializer::{SerializationError, Serializer};

/// Contract violations when reading typed values out of a [`TransportContext`].
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("attribute `{name}` is not present on the call")]
    MissingAttribute { name: String },
    #[error("path parameter `{name}` is not present on the call")]
    MissingPathParam { name: String },
    #[error("value of `{name}` cannot be read as {type_name}")]
    Coercion {
        name: String,
        type_name: &'static str,
        #[source]
        source: SerializationError,
    },
}

/// Per-invocation context handed to handlers and inspectors.
///
/// Binds the operation identity, the call state and the serializer used to
/// coerce attribute and path parameter values.
#[derive(Debug, Clone)]
pub struct TransportContext {
    operation: OperationInformation,
    call: CallInformation,
    serializer: Arc<dyn Serializer>,
}

impl TransportContext {
    #[must_use]
    pub fn new(operation: OperationInformation, call: CallInformation, serializer: Arc<dyn Serializer>) -> Self {
        Self {
            operation,
            call,
            serializer,
        }
    }

    #[must_use]
    pub fn operation(&self) -> &OperationInformation {
        &self.operation
    }

    #[must_use]
    pub fn call(&self) -> &CallInformation {
        &self.call
    }

    pub fn call_mut(&mut self) -> &mut CallInformation {
        &mut self.call
    }

    #[must_use]
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    #[must_use]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.call.transaction_id
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.call.attributes.contains(name)
    }

    /// Reads an attribute as `T`.
    ///
    /// # Errors
    ///
    /// [`ContextError::MissingAttribute`] if absent, [`ContextError::Coercion`]
    /// if the stored value does not fit `T`.
    pub fn get_attribute<T: DeserializeOwned>(&self, name: &str) -> Result<T, ContextError> {
        self.read(&self.call.attributes, name)
            .unwrap_or_else(|| Err(ContextError::MissingAttribute { name: name.to_string() }))
    }

    #[must_use]
    pub fn has_path_param(&self, name: &str) -> bool {
        self.call.path_params.contains(name)
    }

    /// Reads a path parameter as `T`.
    ///
    /// # Errors
    ///
    /// [`ContextError::MissingPathParam`] if absent, [`ContextError::Coercion`]
    /// if the stored value does not fit `T`.
    pub fn get_path_param<T: DeserializeOwned>(&self, name: &str) -> Result<T, ContextError> {
        self.read(&self.call.path_params, name)
            .unwrap_or_else(|| Err(ContextError::MissingPathParam { name: name.to_string() }))
    }

    #[must_use]
    pub fn into_parts(self) -> (OperationInformation, CallInformation, Arc<dyn Serializer>) {
        (self.operation, self.call, self.serializer)
    }

    fn read<T: DeserializeOwned>(&self, from: &Attributes, name: &str) -> Option<Result<T, ContextError>> {
        let value = from.get(name)?.clone();
        Some(
            self.serializer
                .from_document(value)
                .map_err(|source| ContextError::Coercion {
                    name: name.to_string(),
                    type_name: type_name::<T>(),
                    source,
                }),
        )
    }
}
