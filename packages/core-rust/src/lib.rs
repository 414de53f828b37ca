//! opwire core: the result envelope, call-context model, metavalues and the
//! serializer capability shared by every opwire crate.

pub mod attributes;
pub mod call;
pub mod characters;
pub mod clock;
pub mod context;
pub mod envelope;
pub mod error;
pub mod meta;
pub mod operation;
pub mod result;
pub mod serializer;

pub use attributes::{Attribute, Attributes};
pub use call::{CallInformation, TransactionId};
pub use characters::{Characters, Identifier};
#[cfg(any(test, feature = "test-util"))]
pub use clock::ManualClock;
pub use clock::{ClockSource, SystemClock};
pub use context::{ContextError, TransportContext};
pub use envelope::{RequestEnvelope, ResultEnvelope};
pub use error::{codes, describe_failure, describe_panic, ErrorDetails, TransportError};
pub use meta::{Metavalue, Metavalues};
pub use operation::{GenericOperation, OperationCall, OperationInformation, OperationType};
pub use result::{is_success_status, status, Payload, TransportResult};
pub use serializer::{
    default_serializer, set_default_serializer, Document, JsonSerializer, SerializationError, Serializer,
};
