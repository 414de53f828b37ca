//! The dispatch pipeline: inspect, cache, route, handle, inspect.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use opwire_core::{
    codes, describe_failure, describe_panic, status, CallInformation, Document, ErrorDetails, OperationType, TransactionId,
    TransportContext, TransportError, TransportResult,
};
use tracing::{debug, error, warn};

use super::error::DispatcherError;
use super::handler::{HandlerKind, OperationHandler};
use super::inspector::{RequestInspector, ResponseInspector};
use super::router::HandlerRegistry;
use crate::cache::{ContextCache, InMemoryContextCache};

const SOURCE: &str = "Dispatcher";

/// Routes operations to handlers and isolates their failures.
///
/// Registration takes `&mut self`; once the dispatcher is shared behind an
/// `Arc` the registries are read-only.
///
/// An inbound dispatcher persists each call's context to the
/// [`ContextCache`]. An outbound dispatcher (`cache_reads`) never writes and
/// serves [`get_call_info_from_cache`](Self::get_call_info_from_cache) instead.
pub struct Dispatcher {
    registry: HandlerRegistry,
    request_inspector: Option<Arc<dyn RequestInspector>>,
    response_inspector: Option<Arc<dyn ResponseInspector>>,
    cache: Arc<dyn ContextCache>,
    cache_reads: bool,
    session_identifier: String,
}

impl Dispatcher {
    /// Dispatcher for the inbound side of a boundary.
    #[must_use]
    pub fn inbound() -> Self {
        Self::with_cache_mode(false)
    }

    /// Dispatcher for the outbound side of a boundary.
    #[must_use]
    pub fn outbound() -> Self {
        Self::with_cache_mode(true)
    }

    fn with_cache_mode(cache_reads: bool) -> Self {
        Self {
            registry: HandlerRegistry::new(),
            request_inspector: None,
            response_inspector: None,
            cache: Arc::new(InMemoryContextCache::default()),
            cache_reads,
            session_identifier: String::new(),
        }
    }

    // -- configuration ------------------------------------------------------

    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `id` is already registered.
    pub fn add_request_handler(
        &mut self,
        id: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Result<&mut Self, DispatcherError> {
        self.registry
            .register_exact(id.into(), HandlerKind::Request, Arc::new(handler))?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `id` is already registered.
    pub fn add_message_handler(
        &mut self,
        id: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Result<&mut Self, DispatcherError> {
        self.registry
            .register_exact(id.into(), HandlerKind::Message, Arc::new(handler))?;
        Ok(self)
    }

    /// Registers a handler for every operation id starting with `prefix`
    /// (case-insensitive) that has no exact handler.
    ///
    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `prefix` is already registered.
    pub fn add_pattern_handler(
        &mut self,
        prefix: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Result<&mut Self, DispatcherError> {
        self.registry.register_pattern(prefix.into(), Arc::new(handler))?;
        Ok(self)
    }

    pub fn set_request_inspector(&mut self, inspector: impl RequestInspector + 'static) -> &mut Self {
        self.request_inspector = Some(Arc::new(inspector));
        self
    }

    pub fn set_response_inspector(&mut self, inspector: impl ResponseInspector + 'static) -> &mut Self {
        self.response_inspector = Some(Arc::new(inspector));
        self
    }

    pub fn set_context_cache(&mut self, cache: Arc<dyn ContextCache>) -> &mut Self {
        self.cache = cache;
        self
    }

    pub fn set_session_identifier(&mut self, session_identifier: impl Into<String>) -> &mut Self {
        self.session_identifier = session_identifier.into();
        self
    }

    #[must_use]
    pub fn reads_cache(&self) -> bool {
        self.cache_reads
    }

    #[must_use]
    pub fn context_cache(&self) -> &Arc<dyn ContextCache> {
        &self.cache
    }

    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    // -- dispatch -----------------------------------------------------------

    /// Routes by operation type. A message result is returned without payload.
    pub async fn route_from_gateway_request(&self, payload: Document, ctx: TransportContext) -> TransportResult<Document> {
        match ctx.operation().operation_type {
            OperationType::Request => self.handle_as_request(payload, ctx).await,
            OperationType::Message => self.handle_as_message(payload, ctx).await.convert_to_empty(),
        }
    }

    /// Request path: inspect request, then cache write, then route.
    ///
    /// An inspector verdict returns before the cache is touched.
    pub async fn handle_as_request(&self, payload: Document, ctx: TransportContext) -> TransportResult<Document> {
        if let Some(verdict) = self.inspect_request(&payload, &ctx).await {
            return self.inspect_response(verdict, &ctx).await;
        }
        if let Some(failure) = self.persist_context(&ctx).await {
            return Self::tagged(failure, &ctx);
        }
        let result = self.route(HandlerKind::Request, payload, &ctx).await;
        self.inspect_response(result, &ctx).await
    }

    /// Message path: inspect request, cache write, then the verdict.
    ///
    /// Unlike the request path the cache is written even when the inspector
    /// has a verdict, and a cache failure takes precedence over that verdict.
    pub async fn handle_as_message(&self, payload: Document, ctx: TransportContext) -> TransportResult<Document> {
        let verdict = self.inspect_request(&payload, &ctx).await;
        if let Some(failure) = self.persist_context(&ctx).await {
            return Self::tagged(failure, &ctx);
        }
        if let Some(verdict) = verdict {
            return self.inspect_response(verdict, &ctx).await;
        }
        let result = self.route(HandlerKind::Message, payload, &ctx).await;
        self.inspect_response(result, &ctx).await
    }

    /// Best-effort cache read. Misses and failures are logged and yield `None`.
    pub async fn get_call_info_from_cache(&self, transaction_id: TransactionId) -> Option<CallInformation> {
        match self.cache.get(transaction_id).await {
            Ok(Some(call)) => Some(call),
            Ok(None) => {
                debug!(source = SOURCE, %transaction_id, "no cached call context");
                None
            }
            Err(err) => {
                warn!(source = SOURCE, %transaction_id, error = %format!("{err:#}"), "context cache read failed");
                None
            }
        }
    }

    // -- pipeline steps -----------------------------------------------------

    async fn inspect_request(&self, payload: &Document, ctx: &TransportContext) -> Option<TransportResult<Document>> {
        let inspector = self.request_inspector.as_ref()?;
        let outcome = AssertUnwindSafe(inspector.inspect(payload, ctx)).catch_unwind().await;
        match outcome {
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                warn!(
                    source = SOURCE,
                    operation_id = %ctx.operation().id,
                    error = %format!("{err:#}"),
                    "request inspector failed; continuing"
                );
                None
            }
            Err(panic) => {
                error!(
                    source = SOURCE,
                    operation_id = %ctx.operation().id,
                    panic = %panic_message(panic.as_ref()),
                    "request inspector panicked; continuing"
                );
                None
            }
        }
    }

    async fn inspect_response(&self, result: TransportResult<Document>, ctx: &TransportContext) -> TransportResult<Document> {
        let Some(inspector) = self.response_inspector.as_ref() else {
            return Self::tagged(result, ctx);
        };
        let outcome = AssertUnwindSafe(inspector.inspect(&result, ctx)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(Some(replacement))) => replacement,
            Ok(Ok(None)) => result,
            Ok(Err(err)) => {
                warn!(
                    source = SOURCE,
                    operation_id = %ctx.operation().id,
                    error = %format!("{err:#}"),
                    "response inspector failed; keeping original result"
                );
                result
            }
            Err(panic) => {
                error!(
                    source = SOURCE,
                    operation_id = %ctx.operation().id,
                    panic = %panic_message(panic.as_ref()),
                    "response inspector panicked; keeping original result"
                );
                result
            }
        };
        Self::tagged(result, ctx)
    }

    /// Writes the call context on inbound dispatchers. `Some` is a request-fatal failure.
    async fn persist_context(&self, ctx: &TransportContext) -> Option<TransportResult<Document>> {
        if self.cache_reads {
            return None;
        }
        let transaction_id = ctx.transaction_id()?;
        let technical = match self.cache.put(transaction_id, ctx.call()).await {
            Ok(true) => return None,
            Ok(false) => "context cache declined the write".to_string(),
            Err(err) => describe_failure(&err),
        };
        error!(
            source = SOURCE,
            operation_id = %ctx.operation().id,
            %transaction_id,
            error = %technical,
            "failed to persist call context"
        );
        Some(self.failure(
            status::INTERNAL_SERVER_ERROR,
            codes::CONTEXT_CACHE_PERSISTANCE,
            technical,
            ctx,
        ))
    }

    async fn route(&self, kind: HandlerKind, payload: Document, ctx: &TransportContext) -> TransportResult<Document> {
        let id = ctx.operation().id.as_str();
        let handler = self
            .registry
            .resolve_exact(id, kind)
            .or_else(|| self.registry.resolve_pattern(id));
        match handler {
            Some(handler) => self.invoke(handler.as_ref(), payload, ctx).await,
            None => self.failure(
                status::BAD_REQUEST,
                codes::HANDLER_NOT_FOUND,
                format!("no matching handlers for operation {id}"),
                ctx,
            ),
        }
    }

    async fn invoke(&self, handler: &dyn OperationHandler, payload: Document, ctx: &TransportContext) -> TransportResult<Document> {
        let outcome = AssertUnwindSafe(handler.handle(payload, ctx.clone()))
            .catch_unwind()
            .await;
        let technical = match outcome {
            Ok(Ok(result)) => return result,
            Ok(Err(err)) => describe_failure(&err),
            Err(panic) => format!("handler {}", describe_panic(panic.as_ref())),
        };
        error!(
            source = SOURCE,
            operation_id = %ctx.operation().id,
            error = %technical,
            "handler failed"
        );
        self.failure(
            status::INTERNAL_SERVER_ERROR,
            codes::UNHANDLED_ERROR,
            technical,
            ctx,
        )
    }

    /// A dispatcher-generated failure, stamped with call details.
    fn failure(&self, status_code: u16, code: &str, technical: String, ctx: &TransportContext) -> TransportResult<Document> {
        let details = ErrorDetails::new(technical, "")
            .with_session_identifier(self.session_identifier.as_str())
            .with_calling_client(ctx.operation().calling_client.as_str())
            .with_called_operation(ctx.operation().id.as_str())
            .with_transaction_id(ctx.transaction_id());
        TransportResult::failed_with(status_code, TransportError::new(code).with_details(details))
    }

    fn tagged(mut result: TransportResult<Document>, ctx: &TransportContext) -> TransportResult<Document> {
        result.bind_serializer_if_unset(ctx.serializer());
        result
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::inbound()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use opwire_core::{JsonSerializer, OperationInformation};
    use serde_json::json;

    use super::*;
    use crate::dispatch::handler::handler_fn;
    use crate::dispatch::inspector::{request_inspector_fn, response_inspector_fn};

    fn ctx(id: &str, operation_type: OperationType) -> TransportContext {
        TransportContext::new(
            OperationInformation::new(id, "read", operation_type).with_calling_client("tests"),
            CallInformation::new("en-US", "acme"),
            Arc::new(JsonSerializer::new()),
        )
    }

    fn answer(tag: &'static str) -> impl OperationHandler {
        handler_fn(move |_, _| async move { Ok(TransportResult::ok(json!(tag))) })
    }

    /// Cache that counts calls and fails or declines writes on demand.
    #[derive(Default)]
    struct ScriptedCache {
        puts: AtomicUsize,
        decline: bool,
        fail: bool,
        stored: Mutex<Option<CallInformation>>,
    }

    #[async_trait]
    impl ContextCache for ScriptedCache {
        async fn put(&self, _tx: TransactionId, call: &CallInformation) -> anyhow::Result<bool> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("cache offline");
            }
            *self.stored.lock().unwrap() = Some(call.clone());
            Ok(!self.decline)
        }

        async fn get(&self, _tx: TransactionId) -> anyhow::Result<Option<CallInformation>> {
            if self.fail {
                anyhow::bail!("cache offline");
            }
            Ok(self.stored.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn exact_handler_beats_pattern() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.add_request_handler("svc.get", answer("exact")).unwrap();
        dispatcher.add_pattern_handler("svc.", answer("pattern")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.get", OperationType::Request)).await;
        assert_eq!(result.value(), Some(&json!("exact")));
        assert!(result.serializer().is_some());
    }

    #[tokio::test]
    async fn pattern_fallback_and_handler_not_found() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.add_pattern_handler("svc.", answer("pattern")).unwrap();

        let hit = dispatcher.handle_as_request(json!({}), ctx("svc.x", OperationType::Request)).await;
        assert_eq!(hit.value(), Some(&json!("pattern")));

        let miss = dispatcher.handle_as_request(json!({}), ctx("other.x", OperationType::Request)).await;
        assert_eq!(miss.status_code(), 400);
        let error = miss.error().unwrap();
        assert_eq!(error.code, codes::HANDLER_NOT_FOUND);
        assert_eq!(error.technical_error(), Some("no matching handlers for operation other.x"));
        let details = error.details.as_ref().unwrap();
        assert_eq!(details.called_operation.as_deref(), Some("other.x"));
        assert_eq!(details.calling_client.as_deref(), Some("tests"));
        assert!(details.transaction_id.is_some());
    }

    #[tokio::test]
    async fn message_handler_is_not_used_for_requests() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.add_message_handler("svc.audit", answer("message")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.audit", OperationType::Request)).await;
        assert_eq!(result.status_code(), 400);

        let result = dispatcher.handle_as_message(json!({}), ctx("svc.audit", OperationType::Message)).await;
        assert!(result.success());
    }

    #[tokio::test]
    async fn longest_pattern_is_selected() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.add_pattern_handler("svc.", answer("short")).unwrap();
        dispatcher.add_pattern_handler("svc.items.", answer("long")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.items.get", OperationType::Request)).await;
        assert_eq!(result.value(), Some(&json!("long")));
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_the_first_handler() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.add_request_handler("svc.get", answer("first")).unwrap();
        assert!(dispatcher.add_request_handler("svc.get", answer("second")).is_err());
        assert!(dispatcher.add_message_handler("svc.get", answer("second")).is_err());
        assert!(dispatcher.add_pattern_handler("svc.get", answer("second")).is_err());

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.get", OperationType::Request)).await;
        assert_eq!(result.value(), Some(&json!("first")));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_500() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher
            .add_request_handler(
                "svc.err",
                handler_fn(|_, _| async { Err(anyhow::anyhow!("database unavailable")) }),
            )
            .unwrap();
        dispatcher
            .add_request_handler(
                "svc.panic",
                handler_fn(|_, _| async {
                    if true {
                        panic!("handler exploded");
                    }
                    Ok(TransportResult::ok_empty())
                }),
            )
            .unwrap();

        let failed = dispatcher.handle_as_request(json!({}), ctx("svc.err", OperationType::Request)).await;
        assert_eq!(failed.status_code(), 500);
        assert_eq!(failed.error().unwrap().code, codes::UNHANDLED_ERROR);
        assert!(failed.error().unwrap().technical_error().unwrap().contains("database unavailable"));

        let panicked = dispatcher.handle_as_request(json!({}), ctx("svc.panic", OperationType::Request)).await;
        assert_eq!(panicked.status_code(), 500);
        assert!(panicked.error().unwrap().technical_error().unwrap().contains("handler exploded"));
    }

    #[tokio::test]
    async fn unhandled_error_detail_has_message_type_and_backtrace() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher
            .add_request_handler(
                "svc.io",
                handler_fn(|_, _| async {
                    Err(anyhow::Error::from(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "disk gone",
                    )))
                }),
            )
            .unwrap();
        dispatcher
            .add_request_handler(
                "svc.panic",
                handler_fn(|_, _| async {
                    if true {
                        panic!("handler exploded");
                    }
                    Ok(TransportResult::ok_empty())
                }),
            )
            .unwrap();

        let failed = dispatcher.handle_as_request(json!({}), ctx("svc.io", OperationType::Request)).await;
        let technical = failed.error().unwrap().technical_error().unwrap().to_string();
        assert!(technical.starts_with("disk gone"));
        assert!(technical.contains("type: std::io::Error"));
        assert!(technical.contains("backtrace:"));

        let panicked = dispatcher.handle_as_request(json!({}), ctx("svc.panic", OperationType::Request)).await;
        let technical = panicked.error().unwrap().technical_error().unwrap().to_string();
        assert!(technical.starts_with("handler panicked: handler exploded"));
        assert!(technical.contains("type: &str"));
        assert!(technical.contains("backtrace:"));
    }

    #[tokio::test]
    async fn request_inspector_verdict_skips_cache_on_request_path() {
        let cache = Arc::new(ScriptedCache::default());
        let mut dispatcher = Dispatcher::inbound();
        dispatcher
            .set_context_cache(cache.clone())
            .set_request_inspector(request_inspector_fn(|_, _| {
                Ok(Some(TransportResult::not_found("Denied", "", "")))
            }));
        dispatcher.add_request_handler("svc.get", answer("handler")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.get", OperationType::Request)).await;
        assert_eq!(result.status_code(), 404);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn message_path_writes_cache_before_honoring_verdict() {
        let cache = Arc::new(ScriptedCache::default());
        let mut dispatcher = Dispatcher::inbound();
        dispatcher
            .set_context_cache(cache.clone())
            .set_request_inspector(request_inspector_fn(|_, _| {
                Ok(Some(TransportResult::not_found("Denied", "", "")))
            }));

        let result = dispatcher.handle_as_message(json!({}), ctx("svc.audit", OperationType::Message)).await;
        assert_eq!(result.status_code(), 404);
        assert_eq!(cache.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn message_path_cache_failure_beats_verdict() {
        let cache = Arc::new(ScriptedCache {
            fail: true,
            ..ScriptedCache::default()
        });
        let mut dispatcher = Dispatcher::inbound();
        dispatcher
            .set_context_cache(cache)
            .set_request_inspector(request_inspector_fn(|_, _| {
                Ok(Some(TransportResult::not_found("Denied", "", "")))
            }));

        let result = dispatcher.handle_as_message(json!({}), ctx("svc.audit", OperationType::Message)).await;
        assert_eq!(result.status_code(), 500);
        assert_eq!(result.error().unwrap().code, codes::CONTEXT_CACHE_PERSISTANCE);
    }

    #[tokio::test]
    async fn declined_cache_write_fails_the_request() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.set_context_cache(Arc::new(ScriptedCache {
            decline: true,
            ..ScriptedCache::default()
        }));
        dispatcher.add_request_handler("svc.get", answer("handler")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.get", OperationType::Request)).await;
        assert_eq!(result.status_code(), 500);
        assert_eq!(result.error().unwrap().code, codes::CONTEXT_CACHE_PERSISTANCE);
    }

    #[tokio::test]
    async fn outbound_dispatcher_never_writes() {
        let cache = Arc::new(ScriptedCache::default());
        let mut dispatcher = Dispatcher::outbound();
        dispatcher.set_context_cache(cache.clone());
        dispatcher.add_request_handler("svc.get", answer("handler")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.get", OperationType::Request)).await;
        assert!(result.success());
        assert_eq!(cache.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inspector_failures_are_isolated() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher
            .set_request_inspector(request_inspector_fn(|_, _| Err(anyhow::anyhow!("inspector bug"))))
            .set_response_inspector(response_inspector_fn(|_, _| panic!("response inspector bug")));
        dispatcher.add_request_handler("svc.get", answer("handler")).unwrap();

        let result = dispatcher.handle_as_request(json!({}), ctx("svc.get", OperationType::Request)).await;
        assert_eq!(result.value(), Some(&json!("handler")));
    }

    #[tokio::test]
    async fn response_inspector_sees_not_found_and_may_replace() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.set_response_inspector(response_inspector_fn(|result, _| {
            if result.status_code() == 400 {
                Ok(Some(TransportResult::not_found("Rewritten", "", "")))
            } else {
                Ok(None)
            }
        }));

        let result = dispatcher.handle_as_request(json!({}), ctx("nothing.here", OperationType::Request)).await;
        assert_eq!(result.status_code(), 404);
        assert_eq!(result.error().unwrap().code, "Rewritten");
    }

    #[tokio::test]
    async fn gateway_messages_return_no_payload() {
        let mut dispatcher = Dispatcher::inbound();
        dispatcher.add_message_handler("svc.audit", answer("ignored")).unwrap();

        let result = dispatcher
            .route_from_gateway_request(json!({}), ctx("svc.audit", OperationType::Message))
            .await;
        assert!(result.success());
        assert!(result.value().is_none());
    }

    #[tokio::test]
    async fn cache_reads_are_best_effort() {
        let mut dispatcher = Dispatcher::outbound();
        dispatcher.set_context_cache(Arc::new(ScriptedCache {
            fail: true,
            ..ScriptedCache::default()
        }));
        assert!(dispatcher.get_call_info_from_cache(TransactionId::new()).await.is_none());

        let inbound = Dispatcher::inbound();
        let context = ctx("svc.get", OperationType::Request);
        let tx = context.transaction_id().unwrap();
        inbound.context_cache().put(tx, context.call()).await.unwrap();
        assert_eq!(
            inbound.get_call_info_from_cache(tx).await.map(|c| c.data_tenant),
            Some("acme".to_string())
        );
    }
}
