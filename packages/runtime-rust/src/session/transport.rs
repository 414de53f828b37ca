//! Transport boundary between sessions.
//!
//! A [`Transport`] moves serialized request envelopes to another session and
//! returns its serialized result. [`ForwardingHandler`] plugs a transport into
//! a dispatcher as a pattern handler, so an outbound client can call
//! operations served elsewhere.

use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use opwire_core::{Document, RequestEnvelope, TransportContext, TransportResult};

use super::session::{IncomingRequest, Session};
use crate::dispatch::{HandlerResult, OperationHandler};

/// Carries one serialized request envelope and returns the serialized result.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: String) -> anyhow::Result<String>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: String) -> anyhow::Result<String> {
        (**self).send(request).await
    }
}

// ---------------------------------------------------------------------------
// InProcessTransport
// ---------------------------------------------------------------------------

/// Loopback transport that hands requests to a session in the same process.
#[derive(Clone)]
pub struct InProcessTransport {
    session: Session,
}

impl InProcessTransport {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn send(&self, request: String) -> anyhow::Result<String> {
        let result = self
            .session
            .accept_incoming_request(IncomingRequest::Serialized(request), None)
            .await;
        Ok(result.serialize()?)
    }
}

// ---------------------------------------------------------------------------
// ForwardingHandler
// ---------------------------------------------------------------------------

/// Sends every operation it handles across a [`Transport`].
///
/// The request envelope and the response are encoded with the calling
/// context's serializer. A transport failure is returned as an error, which
/// the dispatcher reports as a 500.
pub struct ForwardingHandler<T> {
    transport: T,
}

impl<T: Transport> ForwardingHandler<T> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl<T: Transport + 'static> OperationHandler for ForwardingHandler<T> {
    async fn handle(&self, payload: Document, ctx: TransportContext) -> HandlerResult {
        let (operation, call, serializer) = ctx.into_parts();
        let envelope = RequestEnvelope::from_parts(&operation, &call, payload);
        let request = serializer
            .serialize(&envelope)
            .with_context(|| format!("failed to encode request for {}", operation.id))?;

        let response = self
            .transport
            .send(request)
            .await
            .with_context(|| format!("transport failed for {}", operation.id))?;

        let result = TransportResult::<Document>::from_text(serializer, &response)
            .with_context(|| format!("malformed response for {}", operation.id))?;
        Ok(result.convert())
    }
}
