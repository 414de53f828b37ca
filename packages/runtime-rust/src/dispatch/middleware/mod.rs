//! Tower middleware around dispatch.
//!
//! - [`metrics`]: per-call span, counters and duration histogram
//! - [`pipeline`]: composes the layers over a [`DispatchService`](crate::dispatch::DispatchService)

pub mod metrics;
pub mod pipeline;

pub use metrics::{MetricsLayer, MetricsService};
pub use pipeline::{build_dispatch_pipeline, DispatchPipeline};
