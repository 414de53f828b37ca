//! Pipeline composition: wraps a [`DispatchService`] in the middleware stack.

use std::sync::Arc;

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::service::DispatchService;

/// The service sessions dispatch through.
pub type DispatchPipeline = MetricsService<DispatchService>;

/// Builds the dispatch pipeline over `dispatcher`.
///
/// Timeouts and load shedding are left to the host; the stack only observes.
#[must_use]
pub fn build_dispatch_pipeline(dispatcher: Arc<Dispatcher>) -> DispatchPipeline {
    ServiceBuilder::new()
        .layer(MetricsLayer)
        .service(DispatchService::new(dispatcher))
}
