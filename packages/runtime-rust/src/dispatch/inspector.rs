//! Request and response inspectors: hooks that run around every dispatch.

use async_trait::async_trait;
use opwire_core::{Document, TransportContext, TransportResult};

/// Runs before routing.
///
/// Returning `Some(result)` short-circuits the call with that result.
/// An error or panic is logged and the call proceeds.
#[async_trait]
pub trait RequestInspector: Send + Sync {
    async fn inspect(
        &self,
        payload: &Document,
        ctx: &TransportContext,
    ) -> anyhow::Result<Option<TransportResult<Document>>>;
}

/// Runs on every result before it leaves the dispatcher.
///
/// Returning `Some(result)` replaces the outgoing result. An error or panic is
/// logged and the original result is returned.
#[async_trait]
pub trait ResponseInspector: Send + Sync {
    async fn inspect(
        &self,
        result: &TransportResult<Document>,
        ctx: &TransportContext,
    ) -> anyhow::Result<Option<TransportResult<Document>>>;
}

pub struct RequestInspectorFn<F>(F);

/// Wraps a synchronous closure as a [`RequestInspector`].
pub fn request_inspector_fn<F>(f: F) -> RequestInspectorFn<F>
where
    F: Fn(&Document, &TransportContext) -> anyhow::Result<Option<TransportResult<Document>>> + Send + Sync + 'static,
{
    RequestInspectorFn(f)
}

#[async_trait]
impl<F> RequestInspector for RequestInspectorFn<F>
where
    F: Fn(&Document, &TransportContext) -> anyhow::Result<Option<TransportResult<Document>>> + Send + Sync + 'static,
{
    async fn inspect(
        &self,
        payload: &Document,
        ctx: &TransportContext,
    ) -> anyhow::Result<Option<TransportResult<Document>>> {
        (self.0)(payload, ctx)
    }
}

pub struct ResponseInspectorFn<F>(F);

/// Wraps a synchronous closure as a [`ResponseInspector`].
pub fn response_inspector_fn<F>(f: F) -> ResponseInspectorFn<F>
where
    F: Fn(&TransportResult<Document>, &TransportContext) -> anyhow::Result<Option<TransportResult<Document>>>
        + Send
        + Sync
        + 'static,
{
    ResponseInspectorFn(f)
}

#[async_trait]
impl<F> ResponseInspector for ResponseInspectorFn<F>
where
    F: Fn(&TransportResult<Document>, &TransportContext) -> anyhow::Result<Option<TransportResult<Document>>>
        + Send
        + Sync
        + 'static,
{
    async fn inspect(
        &self,
        result: &TransportResult<Document>,
        ctx: &TransportContext,
    ) -> anyhow::Result<Option<TransportResult<Document>>> {
        (self.0)(result, ctx)
    }
}
