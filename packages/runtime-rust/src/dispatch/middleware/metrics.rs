//! Metrics middleware for dispatch.
//!
//! Opens a `tracing` span per call and records `opwire_dispatch_total` and
//! `opwire_dispatch_duration_seconds` through the `metrics` facade. Without an
//! installed recorder the `metrics` calls are no-ops.

use std::convert::Infallible;
use std::task::{Context, Poll};
use std::time::Instant;

use futures_util::future::BoxFuture;
use opwire_core::{Document, OperationType, TransportResult};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::dispatch::service::DispatchCall;

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments dispatch with timing and outcome counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<DispatchCall> for MetricsService<S>
where
    S: Service<DispatchCall, Response = TransportResult<Document>, Error = Infallible> + Send,
    S::Future: Send + 'static,
{
    type Response = TransportResult<Document>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<TransportResult<Document>, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, call: DispatchCall) -> Self::Future {
        let operation = call.context.operation();
        let operation_id = operation.id.clone();
        let operation_type = match operation.operation_type {
            OperationType::Request => "request",
            OperationType::Message => "message",
        };

        let span = info_span!(
            "dispatch",
            operation_id = %operation_id,
            operation_type = operation_type,
            duration_ms = tracing::field::Empty,
            status = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(call);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();

                let (status, outcome) = match &result {
                    Ok(result) if result.success() => (result.status_code(), "ok"),
                    Ok(result) => (result.status_code(), "error"),
                    Err(never) => match *never {},
                };

                let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("status", status);
                span.record("outcome", outcome);

                metrics::counter!(
                    "opwire_dispatch_total",
                    "operation_type" => operation_type,
                    "outcome" => outcome
                )
                .increment(1);
                metrics::histogram!("opwire_dispatch_duration_seconds", "operation_type" => operation_type)
                    .record(elapsed.as_secs_f64());

                tracing::debug!(
                    operation_id = %operation_id,
                    duration_ms,
                    status,
                    outcome,
                    "dispatch complete"
                );

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use opwire_core::{CallInformation, JsonSerializer, OperationInformation, TransportContext};
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;

    /// Immediately-completing service that fails operations named `fail.*`.
    struct ImmediateService;

    impl Service<DispatchCall> for ImmediateService {
        type Response = TransportResult<Document>;
        type Error = Infallible;
        type Future = BoxFuture<'static, Result<TransportResult<Document>, Infallible>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, call: DispatchCall) -> Self::Future {
            let failing = call.context.operation().id.starts_with("fail.");
            Box::pin(async move {
                Ok(if failing {
                    TransportResult::bad_request("E1", "", "")
                } else {
                    TransportResult::ok(call.payload)
                })
            })
        }
    }

    fn call(id: &str) -> DispatchCall {
        DispatchCall::new(
            json!(7),
            TransportContext::new(
                OperationInformation::new(id, "read", OperationType::Request),
                CallInformation::default(),
                Arc::new(JsonSerializer::new()),
            ),
        )
    }

    #[tokio::test]
    async fn metrics_layer_passes_results_through() {
        let svc = MetricsLayer.layer(ImmediateService);
        let result = svc.oneshot(call("svc.get")).await.unwrap();
        assert_eq!(result.value(), Some(&json!(7)));

        let svc = MetricsLayer.layer(ImmediateService);
        let result = svc.oneshot(call("fail.get")).await.unwrap();
        assert_eq!(result.status_code(), 400);
    }
}
