//! Operation handlers and adapters for closures and typed payloads.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use opwire_core::{codes, Document, OperationType, TransportContext, TransportResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// What every handler returns. `Err` is reported as a 500 by the dispatcher.
pub type HandlerResult = anyhow::Result<TransportResult<Document>>;

/// Which operation type an exact-id handler serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Request,
    Message,
}

impl From<OperationType> for HandlerKind {
    fn from(operation_type: OperationType) -> Self {
        match operation_type {
            OperationType::Request => Self::Request,
            OperationType::Message => Self::Message,
        }
    }
}

/// Handles one operation.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn handle(&self, payload: Document, ctx: TransportContext) -> HandlerResult;
}

#[async_trait]
impl<H: OperationHandler + ?Sized> OperationHandler for Arc<H> {
    async fn handle(&self, payload: Document, ctx: TransportContext) -> HandlerResult {
        (**self).handle(payload, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Closure handlers
// ---------------------------------------------------------------------------

/// Handler backed by an async closure over the raw payload document.
pub struct HandlerFn<F>(F);

/// Wraps `f` as an [`OperationHandler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Document, TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> OperationHandler for HandlerFn<F>
where
    F: Fn(Document, TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, payload: Document, ctx: TransportContext) -> HandlerResult {
        (self.0)(payload, ctx).await
    }
}

// ---------------------------------------------------------------------------
// Typed handlers
// ---------------------------------------------------------------------------

/// Handler that materializes the payload as `Req` and re-documents the `Resp`.
///
/// A payload that does not fit `Req` produces a 400
/// [`DESERIALIZE_ERROR`](codes::DESERIALIZE_ERROR) without calling the closure.
pub struct TypedHandler<Req, Resp, F> {
    f: F,
    types: PhantomData<fn(Req) -> Resp>,
}

/// Typed handler for request operations.
pub fn typed_request_handler<Req, Resp, F, Fut>(f: F) -> TypedHandler<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req, TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TransportResult<Resp>>> + Send + 'static,
{
    TypedHandler {
        f,
        types: PhantomData,
    }
}

/// Typed handler for message operations; the response carries no payload.
pub fn typed_message_handler<Req, F, Fut>(f: F) -> TypedHandler<Req, (), F>
where
    Req: DeserializeOwned + Send + 'static,
    F: Fn(Req, TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TransportResult<()>>> + Send + 'static,
{
    TypedHandler {
        f,
        types: PhantomData,
    }
}

#[async_trait]
impl<Req, Resp, F, Fut> OperationHandler for TypedHandler<Req, Resp, F>
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req, TransportContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TransportResult<Resp>>> + Send + 'static,
{
    async fn handle(&self, payload: Document, ctx: TransportContext) -> HandlerResult {
        let request: Req = match ctx.serializer().from_document(payload) {
            Ok(request) => request,
            Err(err) => {
                return Ok(TransportResult::bad_request(
                    codes::DESERIALIZE_ERROR,
                    err.to_string(),
                    "",
                ))
            }
        };
        let result = (self.f)(request, ctx).await?;
        Ok(result.convert())
    }
}

#[cfg(test)]
mod tests {
    use opwire_core::{CallInformation, JsonSerializer, OperationInformation};
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct GetItem {
        item_id: u32,
    }

    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Item {
        item_id: u32,
        label: String,
    }

    fn ctx() -> TransportContext {
        TransportContext::new(
            OperationInformation::new("svc.items.get", "read", OperationType::Request),
            CallInformation::new("en-US", ""),
            Arc::new(JsonSerializer::new()),
        )
    }

    #[tokio::test]
    async fn closure_handlers_see_payload_and_context() {
        let handler = handler_fn(|payload, ctx: TransportContext| async move {
            Ok(TransportResult::ok(json!({ "echo": payload, "op": ctx.operation().id })))
        });

        let result = handler.handle(json!(1), ctx()).await.unwrap();
        assert_eq!(result.value(), Some(&json!({ "echo": 1, "op": "svc.items.get" })));
    }

    #[tokio::test]
    async fn typed_handlers_decode_requests_and_encode_responses() {
        let handler = typed_request_handler(|req: GetItem, _ctx| async move {
            Ok(TransportResult::ok(Item {
                item_id: req.item_id,
                label: format!("item {}", req.item_id),
            }))
        });

        let result = handler.handle(json!({ "itemId": 4 }), ctx()).await.unwrap();
        assert_eq!(result.value(), Some(&json!({ "itemId": 4, "label": "item 4" })));
    }

    #[tokio::test]
    async fn typed_handlers_reject_malformed_payloads() {
        let handler = typed_request_handler(|_: GetItem, _ctx| async move { Ok(TransportResult::ok(0_u32)) });

        let result = handler.handle(json!({ "itemId": "four" }), ctx()).await.unwrap();
        assert_eq!(result.status_code(), 400);
        assert_eq!(result.error().unwrap().code, codes::DESERIALIZE_ERROR);
    }

    #[tokio::test]
    async fn typed_message_handlers_return_empty_results() {
        let handler = typed_message_handler(|_: GetItem, _ctx| async move { Ok(TransportResult::ok_empty()) });

        let result = handler.handle(json!({ "itemId": 1 }), ctx()).await.unwrap();
        assert!(result.success());
        assert!(result.value().is_none());
    }

    #[test]
    fn kind_follows_operation_type() {
        assert_eq!(HandlerKind::from(OperationType::Request), HandlerKind::Request);
        assert_eq!(HandlerKind::from(OperationType::Message), HandlerKind::Message);
    }
}
