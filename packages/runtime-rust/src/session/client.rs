//! Immutable client handles for outbound calls.

use std::sync::Arc;

use opwire_core::{
    codes, Attributes, CallInformation, Characters, Document, GenericOperation, Identifier, OperationCall,
    OperationInformation, OperationType, Serializer, TransactionId, TransportContext, TransportResult,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::session::Session;

/// Issues operations on behalf of one calling client.
///
/// A `Client` never changes after construction. Every `with_*`, `add_*` and
/// `remove_*` returns a new client with its own copy of the call state, so
/// derived clients can be used concurrently without observing each other.
#[derive(Clone)]
pub struct Client {
    session: Session,
    calling_client: String,
    usage_id: String,
    call: CallInformation,
    match_sessions: bool,
}

impl Client {
    pub(crate) fn new(session: Session, calling_client: String, call: CallInformation, match_sessions: bool) -> Self {
        Self {
            session,
            calling_client,
            usage_id: String::new(),
            call,
            match_sessions,
        }
    }

    #[must_use]
    pub fn calling_client(&self) -> &str {
        &self.calling_client
    }

    #[must_use]
    pub fn usage_id(&self) -> &str {
        &self.usage_id
    }

    #[must_use]
    pub fn call_information(&self) -> &CallInformation {
        &self.call
    }

    #[must_use]
    pub fn matches_sessions(&self) -> bool {
        self.match_sessions
    }

    fn derive(&self, change: impl FnOnce(&mut Self)) -> Self {
        let mut next = self.clone();
        change(&mut next);
        next
    }

    // -- derivations --------------------------------------------------------

    #[must_use]
    pub fn with_locale(&self, locale: impl Into<String>) -> Self {
        let locale = locale.into();
        self.derive(|c| c.call.locale = locale)
    }

    #[must_use]
    pub fn with_data_tenant(&self, data_tenant: impl Into<String>) -> Self {
        let data_tenant = data_tenant.into();
        self.derive(|c| c.call.data_tenant = data_tenant)
    }

    #[must_use]
    pub fn with_characters(&self, characters: Characters) -> Self {
        self.derive(|c| c.call.characters = characters)
    }

    #[must_use]
    pub fn with_subject(&self, subject: Identifier) -> Self {
        self.derive(|c| c.call.characters.subject = Some(subject))
    }

    #[must_use]
    pub fn with_responsible(&self, responsible: Identifier) -> Self {
        self.derive(|c| c.call.characters.responsible = Some(responsible))
    }

    #[must_use]
    pub fn with_performer(&self, performer: Identifier) -> Self {
        self.derive(|c| c.call.characters.performer = Some(performer))
    }

    #[must_use]
    pub fn with_usage_id(&self, usage_id: impl Into<String>) -> Self {
        let usage_id = usage_id.into();
        self.derive(|c| c.usage_id = usage_id)
    }

    /// Opts in or out of recovering cached contexts in
    /// [`with_transaction_id`](Self::with_transaction_id).
    #[must_use]
    pub fn with_match_sessions(&self, match_sessions: bool) -> Self {
        self.derive(|c| c.match_sessions = match_sessions)
    }

    /// Sets an attribute, replacing any previous value of the same name.
    #[must_use]
    pub fn add_attribute(&self, name: impl Into<String>, value: impl Into<Document>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.derive(|c| {
            c.call.attributes.upsert(name, value);
        })
    }

    #[must_use]
    pub fn remove_attribute(&self, name: &str) -> Self {
        self.derive(|c| {
            c.call.attributes.remove(name);
        })
    }

    /// Sets a path parameter, replacing any previous value of the same name.
    #[must_use]
    pub fn add_path_param(&self, name: impl Into<String>, value: impl Into<Document>) -> Self {
        let (name, value) = (name.into(), value.into());
        self.derive(|c| {
            c.call.path_params.upsert(name, value);
        })
    }

    #[must_use]
    pub fn remove_path_param(&self, name: &str) -> Self {
        self.derive(|c| {
            c.call.path_params.remove(name);
        })
    }

    /// Binds `transaction_id` to the derived client.
    ///
    /// When this client matches sessions and its session's dispatcher reads
    /// the context cache, the call state persisted for `transaction_id` on the
    /// inbound side replaces this client's own. On a miss, or otherwise, only
    /// the id is stamped.
    pub async fn with_transaction_id(&self, transaction_id: TransactionId) -> Self {
        let dispatcher = self.session.dispatcher();
        if self.match_sessions && dispatcher.reads_cache() {
            if let Some(cached) = dispatcher.get_call_info_from_cache(transaction_id).await {
                let recovered = cached.with_transaction_id(transaction_id);
                return self.derive(|c| c.call = recovered);
            }
        }
        self.derive(|c| c.call.transaction_id = Some(transaction_id))
    }

    // -- calls --------------------------------------------------------------

    /// Issues a typed request and converts the result to `Resp`.
    ///
    /// The call's path parameters override the client's of the same name.
    pub async fn request<Req, Resp>(&self, operation: OperationCall<Req, Resp>) -> TransportResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned + 'static,
    {
        let mut call = self.call.clone();
        for param in &operation.path_params {
            call.path_params.upsert(param.name.clone(), param.value.clone());
        }
        let payload = match self.session.serializer().to_document(&operation.payload) {
            Ok(payload) => payload,
            Err(err) => return self.serialize_failure(&err),
        };
        self.dispatch(&operation.id, &operation.verb, operation.operation_type, payload, call)
            .await
            .convert()
    }

    /// Issues a fire-and-forget message.
    pub async fn message<Req: Serialize>(&self, operation: OperationCall<Req, ()>) -> TransportResult<()> {
        self.request(operation).await.convert_to_empty()
    }

    /// Issues an operation described as data.
    ///
    /// Its path parameters, and then `custom_attributes`, are added only where
    /// the client does not already hold a value of the same name.
    pub async fn accept_operation(
        &self,
        operation: GenericOperation,
        custom_attributes: Option<&Attributes>,
    ) -> TransportResult<Document> {
        let mut call = self.call.clone();
        call.path_params.merge_absent(&operation.path_params);
        if let Some(custom) = custom_attributes {
            call.attributes.merge_absent(custom);
        }
        self.dispatch(
            &operation.id,
            &operation.verb,
            operation.operation_type,
            operation.payload,
            call,
        )
        .await
    }

    async fn dispatch(
        &self,
        id: &str,
        verb: &str,
        operation_type: OperationType,
        payload: Document,
        mut call: CallInformation,
    ) -> TransportResult<Document> {
        call.ensure_transaction_id();
        let operation = OperationInformation::new(id, verb, operation_type)
            .with_calling_client(self.calling_client.as_str())
            .with_usage_id(self.usage_id.as_str());
        let serializer: Arc<dyn Serializer> = Arc::clone(self.session.serializer());
        let ctx = TransportContext::new(operation, call, Arc::clone(&serializer));
        self.session.dispatch(payload, ctx).await.with_serializer(serializer)
    }

    fn serialize_failure<T>(&self, error: &opwire_core::SerializationError) -> TransportResult<T> {
        TransportResult::internal_server_error(codes::SERIALIZE_ERROR, error.to_string(), "")
            .with_serializer(Arc::clone(self.session.serializer()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
