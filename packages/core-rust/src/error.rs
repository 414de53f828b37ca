//! Structured error carried by a failed [`TransportResult`](crate::TransportResult).

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::call::TransactionId;

/// Machine-readable error codes produced by the runtime itself.
pub mod codes {
    pub const HANDLER_NOT_FOUND: &str = "Opwire.Dispatcher.HandlerNotFound";
    pub const UNHANDLED_ERROR: &str = "Opwire.Dispatcher.UnhandledError";
    /// Spelling is part of the wire contract.
    pub const CONTEXT_CACHE_PERSISTANCE: &str = "Opwire.Dispatcher.ContextCachePersistance";
    pub const DESERIALIZE_ERROR: &str = "Opwire.Serialization.DeserializeError";
    pub const SERIALIZE_ERROR: &str = "Opwire.Serialization.SerializeError";
    pub const MAYBE_EXCEPTION: &str = "Opwire.Result.MaybeException";
    pub const UNKNOWN_ERROR: &str = "Opwire.Result.UnknownError";
}

/// Human- and machine-facing detail for a [`TransportError`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calling_client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub called_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
}

impl ErrorDetails {
    /// Builds details from technical and user messages; empty strings count as absent.
    #[must_use]
    pub fn new(technical_error: impl Into<String>, user_error: impl Into<String>) -> Self {
        Self {
            technical_error: non_empty(technical_error.into()),
            user_error: non_empty(user_error.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_session_identifier(mut self, session_identifier: impl Into<String>) -> Self {
        self.session_identifier = non_empty(session_identifier.into());
        self
    }

    #[must_use]
    pub fn with_calling_client(mut self, calling_client: impl Into<String>) -> Self {
        self.calling_client = non_empty(calling_client.into());
        self
    }

    #[must_use]
    pub fn with_called_operation(mut self, called_operation: impl Into<String>) -> Self {
        self.called_operation = non_empty(called_operation.into());
        self
    }

    #[must_use]
    pub fn with_transaction_id(mut self, transaction_id: Option<TransactionId>) -> Self {
        self.transaction_id = transaction_id;
        self
    }
}

/// Descriptive error envelope. Carries no behavior beyond its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportError {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
    /// Sibling failures, e.g. from a partially failed batch.
    #[serde(default)]
    pub related: Vec<TransportError>,
    /// The error this one wraps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<TransportError>>,
}

impl TransportError {
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            details: None,
            related: Vec::new(),
            parent: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub fn with_related(mut self, related: impl IntoIterator<Item = TransportError>) -> Self {
        self.related.extend(related);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: TransportError) -> Self {
        self.parent = Some(Box::new(parent));
        self
    }

    #[must_use]
    pub fn technical_error(&self) -> Option<&str> {
        self.details.as_ref()?.technical_error.as_deref()
    }

    #[must_use]
    pub fn user_error(&self) -> Option<&str> {
        self.details.as_ref()?.user_error.as_deref()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.technical_error() {
            Some(technical) => write!(f, "{}: {technical}", self.code),
            None => f.write_str(&self.code),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.parent
            .as_deref()
            .map(|parent| parent as &(dyn std::error::Error + 'static))
    }
}

/// Renders an error chain as the technical detail of a 500 result.
///
/// The text holds the full cause chain, the type of the root cause and a
/// backtrace. The backtrace anyhow captured is preferred; otherwise one is
/// taken here.
#[must_use]
pub fn describe_failure(error: &anyhow::Error) -> String {
    let type_name = root_cause_type(error.root_cause());
    let captured = error.backtrace();
    match captured.status() {
        BacktraceStatus::Captured => format!("{error:#}\ntype: {type_name}\nbacktrace:\n{captured}"),
        _ => format!(
            "{error:#}\ntype: {type_name}\nbacktrace:\n{}",
            Backtrace::force_capture()
        ),
    }
}

/// Renders a caught panic payload as the technical detail of a 500 result.
#[must_use]
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    let (message, type_name) = if let Some(message) = payload.downcast_ref::<&str>() {
        ((*message).to_string(), "&str")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        (message.clone(), "alloc::string::String")
    } else {
        ("non-string panic payload".to_string(), "Box<dyn Any + Send>")
    };
    format!(
        "panicked: {message}\ntype: {type_name}\nbacktrace:\n{}",
        Backtrace::force_capture()
    )
}

macro_rules! match_error_type {
    ($root:expr; $($ty:ty => $name:literal),+ $(,)?) => {
        $(
            if $root.is::<$ty>() {
                return $name.to_string();
            }
        )+
    };
}

/// Names the concrete type of `root`.
///
/// Common std and crate errors are recognised by downcast. Anything else is
/// named by the leading identifier of its `Debug` output, which for derived
/// impls is the type or variant name. Ad-hoc `anyhow!` messages have none.
fn root_cause_type(root: &(dyn StdError + 'static)) -> String {
    match_error_type!(root;
        std::io::Error => "std::io::Error",
        fmt::Error => "std::fmt::Error",
        std::num::ParseIntError => "std::num::ParseIntError",
        std::num::ParseFloatError => "std::num::ParseFloatError",
        std::str::Utf8Error => "std::str::Utf8Error",
        std::string::FromUtf8Error => "std::string::FromUtf8Error",
        serde_json::Error => "serde_json::Error",
        crate::serializer::SerializationError => "opwire_core::SerializationError",
        crate::context::ContextError => "opwire_core::ContextError",
        TransportError => "opwire_core::TransportError",
    );
    let debug = format!("{root:?}");
    let ident: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == ':')
        .collect();
    if ident.is_empty() {
        "anyhow::Error".to_string()
    } else {
        ident
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}
