//! `tower::Service` adapter over a shared [`Dispatcher`].

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::BoxFuture;
use opwire_core::{Document, TransportContext, TransportResult};
use tower::Service;

use super::dispatcher::Dispatcher;

/// One dispatch request: the payload document and its context.
#[derive(Debug, Clone)]
pub struct DispatchCall {
    pub payload: Document,
    pub context: TransportContext,
}

impl DispatchCall {
    #[must_use]
    pub fn new(payload: Document, context: TransportContext) -> Self {
        Self { payload, context }
    }
}

/// Routes each [`DispatchCall`] through
/// [`Dispatcher::route_from_gateway_request`]. Every failure is a
/// [`TransportResult`], so the service error type is [`Infallible`].
#[derive(Clone)]
pub struct DispatchService {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchService {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }
}

impl Service<DispatchCall> for DispatchService {
    type Response = TransportResult<Document>;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<TransportResult<Document>, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, call: DispatchCall) -> Self::Future {
        let dispatcher = Arc::clone(&self.dispatcher);
        Box::pin(async move {
            Ok(dispatcher
                .route_from_gateway_request(call.payload, call.context)
                .await)
        })
    }
}
