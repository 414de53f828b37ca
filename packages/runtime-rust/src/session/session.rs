//! Sessions: the entry point for incoming requests and the factory for clients.

use std::convert::Infallible;
use std::sync::Arc;

use opwire_core::{
    codes, Attributes, CallInformation, Document, JsonSerializer, RequestEnvelope, Serializer, TransportContext,
    TransportResult,
};
use tower::ServiceExt;
use tracing::warn;

use super::client::Client;
use crate::cache::{ContextCache, InMemoryContextCache};
use crate::config::RuntimeConfig;
use crate::dispatch::{
    build_dispatch_pipeline, DispatchCall, DispatchPipeline, Dispatcher, DispatcherError, OperationHandler,
    RequestInspector, ResponseInspector,
};

/// A request arriving at a session.
#[derive(Debug, Clone)]
pub enum IncomingRequest {
    /// A request envelope still in wire form.
    Serialized(String),
    /// A request envelope already decoded by the host.
    Structured(RequestEnvelope),
}

/// A configured dispatcher plus the serializer and defaults applied to its calls.
///
/// Cheap to clone; clones share the dispatcher and configuration.
#[derive(Clone)]
pub struct Session {
    config: Arc<RuntimeConfig>,
    dispatcher: Arc<Dispatcher>,
    pipeline: DispatchPipeline,
    serializer: Arc<dyn Serializer>,
}

impl Session {
    /// Builder for an inbound session (persists call contexts).
    #[must_use]
    pub fn builder(config: RuntimeConfig) -> SessionBuilder {
        SessionBuilder::new(config, Dispatcher::inbound())
    }

    /// Builder for an outbound session (reads call contexts, never writes).
    #[must_use]
    pub fn outbound_builder(config: RuntimeConfig) -> SessionBuilder {
        SessionBuilder::new(config, Dispatcher::outbound())
    }

    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }

    /// Accepts a request from outside the process.
    ///
    /// `custom_attributes` are added only where the request does not already
    /// carry an attribute of the same name. Missing locale, tenant and
    /// transaction id are filled from the session defaults. A malformed
    /// envelope yields a 400 [`codes::DESERIALIZE_ERROR`] result.
    pub async fn accept_incoming_request(
        &self,
        incoming: IncomingRequest,
        custom_attributes: Option<&Attributes>,
    ) -> TransportResult<Document> {
        let envelope = match incoming {
            IncomingRequest::Structured(envelope) => envelope,
            IncomingRequest::Serialized(text) => match self.serializer.deserialize::<RequestEnvelope>(&text) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(
                        source = "Session",
                        session = %self.config.session_identifier,
                        error = %err,
                        "rejected malformed request envelope"
                    );
                    return TransportResult::bad_request(codes::DESERIALIZE_ERROR, err.to_string(), "")
                        .with_serializer(Arc::clone(&self.serializer));
                }
            },
        };

        let (operation, mut call, payload) = envelope.into_parts();
        if let Some(custom) = custom_attributes {
            call.attributes.merge_absent(custom);
        }
        self.fill_defaults(&mut call);

        let ctx = TransportContext::new(operation, call, Arc::clone(&self.serializer));
        self.dispatch(payload, ctx)
            .await
            .with_serializer(Arc::clone(&self.serializer))
    }

    /// A client for outbound calls, named `calling_client` in every operation it issues.
    #[must_use]
    pub fn client(&self, calling_client: impl Into<String>) -> Client {
        let call = CallInformation::new(
            self.config.default_locale.clone(),
            self.config.default_data_tenant.clone(),
        );
        Client::new(self.clone(), calling_client.into(), call, self.config.match_sessions)
    }

    pub(crate) async fn dispatch(&self, payload: Document, ctx: TransportContext) -> TransportResult<Document> {
        let outcome: Result<_, Infallible> = self
            .pipeline
            .clone()
            .oneshot(DispatchCall::new(payload, ctx))
            .await;
        match outcome {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    fn fill_defaults(&self, call: &mut CallInformation) {
        if call.locale.is_empty() {
            call.locale.clone_from(&self.config.default_locale);
        }
        if call.data_tenant.is_empty() {
            call.data_tenant.clone_from(&self.config.default_data_tenant);
        }
        call.ensure_transaction_id();
    }
}

// ---------------------------------------------------------------------------
// SessionBuilder
// ---------------------------------------------------------------------------

/// Configures a [`Session`] before any traffic. Registration errors surface
/// immediately from the registering call.
pub struct SessionBuilder {
    config: RuntimeConfig,
    dispatcher: Dispatcher,
    serializer: Arc<dyn Serializer>,
}

impl SessionBuilder {
    fn new(config: RuntimeConfig, mut dispatcher: Dispatcher) -> Self {
        dispatcher
            .set_session_identifier(config.session_identifier.clone())
            .set_context_cache(Arc::new(InMemoryContextCache::new(config.context_ttl)));
        Self {
            config,
            dispatcher,
            serializer: Arc::new(JsonSerializer::new()),
        }
    }

    #[must_use]
    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Replaces the default in-memory cache, e.g. to share one between an
    /// inbound and an outbound session.
    #[must_use]
    pub fn context_cache(mut self, cache: Arc<dyn ContextCache>) -> Self {
        self.dispatcher.set_context_cache(cache);
        self
    }

    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `id` is already registered.
    pub fn request_handler(
        mut self,
        id: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Result<Self, DispatcherError> {
        self.dispatcher.add_request_handler(id, handler)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `id` is already registered.
    pub fn message_handler(
        mut self,
        id: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Result<Self, DispatcherError> {
        self.dispatcher.add_message_handler(id, handler)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// [`DispatcherError::DuplicateHandler`] if `prefix` is already registered.
    pub fn pattern_handler(
        mut self,
        prefix: impl Into<String>,
        handler: impl OperationHandler + 'static,
    ) -> Result<Self, DispatcherError> {
        self.dispatcher.add_pattern_handler(prefix, handler)?;
        Ok(self)
    }

    #[must_use]
    pub fn request_inspector(mut self, inspector: impl RequestInspector + 'static) -> Self {
        self.dispatcher.set_request_inspector(inspector);
        self
    }

    #[must_use]
    pub fn response_inspector(mut self, inspector: impl ResponseInspector + 'static) -> Self {
        self.dispatcher.set_response_inspector(inspector);
        self
    }

    #[must_use]
    pub fn build(self) -> Session {
        let dispatcher = Arc::new(self.dispatcher);
        Session {
            pipeline: build_dispatch_pipeline(Arc::clone(&dispatcher)),
            dispatcher,
            config: Arc::new(self.config),
            serializer: self.serializer,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
