//! Operation dispatch: handler registry, inspectors, the dispatch pipeline
//! and its tower middleware.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod inspector;
pub mod middleware;
pub mod router;
pub mod service;

pub use dispatcher::Dispatcher;
pub use error::{DispatcherError, HandlerSlot};
pub use handler::{
    handler_fn, typed_message_handler, typed_request_handler, HandlerFn, HandlerKind, HandlerResult, OperationHandler,
    TypedHandler,
};
pub use inspector::{request_inspector_fn, response_inspector_fn, RequestInspector, ResponseInspector};
pub use middleware::{build_dispatch_pipeline, DispatchPipeline, MetricsLayer};
pub use router::HandlerRegistry;
pub use service::{DispatchCall, DispatchService};
