//! opwire runtime: operation dispatch, the transaction-scoped context cache,
//! sessions and clients.

pub mod cache;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod session;

pub use cache::{ContextCache, InMemoryContextCache};
pub use config::{LoggingConfig, RuntimeConfig, DEFAULT_CONTEXT_TTL};
pub use dispatch::{
    handler_fn, request_inspector_fn, response_inspector_fn, typed_message_handler, typed_request_handler, Dispatcher,
    DispatcherError, HandlerKind, OperationHandler, RequestInspector, ResponseInspector,
};
pub use logging::init_tracing;
pub use session::{Client, ForwardingHandler, InProcessTransport, IncomingRequest, Session, SessionBuilder, Transport};
