//! The uniform success/failure container returned by every dispatch.
//!
//! A [`TransportResult`] carries an optional payload, an HTTP-like status
//! code, [`Metavalues`] and, on failure, a [`TransportError`]. The invariant
//! `success() == error().is_none() == is_success_status(status_code())` holds
//! for every value built through this module.
//!
//! Payloads are two-state: a materialized `T`, or a [`Document`] that has been
//! read off the wire but not yet turned into a `T`. [`TransportResult::convert`]
//! performs that materialization.

use std::any::{type_name, Any};
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{codes, describe_failure, ErrorDetails, TransportError};
use crate::envelope::ResultEnvelope;
use crate::meta::{Metavalue, Metavalues};
use crate::serializer::{default_serializer, Document, SerializationError, Serializer};

/// Common status codes.
pub mod status {
    pub const OK: u16 = 200;
    pub const BAD_REQUEST: u16 = 400;
    pub const NOT_FOUND: u16 = 404;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
}

/// Returns `true` for codes in the inclusive success range `200..=308`.
#[must_use]
pub fn is_success_status(status_code: u16) -> bool {
    (200..=308).contains(&status_code)
}

/// Payload of a result.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    /// A materialized value.
    Value(T),
    /// A serialized document awaiting materialization.
    Document(Document),
}

/// Success or failure of one operation, with status, metadata and payload.
#[derive(Debug, Clone)]
pub struct TransportResult<T> {
    value: Option<Payload<T>>,
    status_code: u16,
    meta: Metavalues,
    error: Option<TransportError>,
    serializer: Option<Arc<dyn Serializer>>,
}

impl<T> TransportResult<T> {
    fn from_raw(
        value: Option<Payload<T>>,
        status_code: u16,
        meta: Metavalues,
        error: Option<TransportError>,
        serializer: Option<Arc<dyn Serializer>>,
    ) -> Self {
        Self {
            value,
            status_code,
            meta,
            error,
            serializer,
        }
    }

    /// Success with a value and status 200.
    pub fn ok(value: T) -> Self {
        Self::ok_with_meta(value, Metavalues::default())
    }

    pub fn ok_with_meta(value: T, meta: Metavalues) -> Self {
        Self::from_raw(Some(Payload::Value(value)), status::OK, meta, None, None)
    }

    /// Success without a payload.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::from_raw(None, status::OK, Metavalues::default(), None, None)
    }

    /// Success whose payload is still a serialized document.
    #[must_use]
    pub fn ok_document(document: Document) -> Self {
        Self::from_raw(
            Some(Payload::Document(document)),
            status::OK,
            Metavalues::default(),
            None,
            None,
        )
    }

    /// Payload-less success with a caller-chosen status.
    ///
    /// A code outside `200..=308` yields a failed result with
    /// [`codes::UNKNOWN_ERROR`] instead.
    #[must_use]
    pub fn ok_status(status_code: u16) -> Self {
        if is_success_status(status_code) {
            Self::from_raw(None, status_code, Metavalues::default(), None, None)
        } else {
            Self::failed(
                status_code,
                codes::UNKNOWN_ERROR,
                format!("status {status_code} is not a success status"),
                "",
            )
        }
    }

    /// A failure. Empty messages are treated as absent; a success-range
    /// status is replaced by 500 so the result stays a failure.
    #[must_use]
    pub fn failed(
        status_code: u16,
        code: impl Into<String>,
        technical_error: impl Into<String>,
        user_error: impl Into<String>,
    ) -> Self {
        let details = ErrorDetails::new(technical_error, user_error);
        let error = if details == ErrorDetails::default() {
            TransportError::new(code)
        } else {
            TransportError::new(code).with_details(details)
        };
        Self::failed_with(status_code, error)
    }

    /// A failure carrying a prebuilt error.
    #[must_use]
    pub fn failed_with(status_code: u16, error: TransportError) -> Self {
        let status_code = if is_success_status(status_code) {
            status::INTERNAL_SERVER_ERROR
        } else {
            status_code
        };
        Self::from_raw(None, status_code, Metavalues::default(), Some(error), None)
    }

    #[must_use]
    pub fn not_found(code: impl Into<String>, technical_error: impl Into<String>, user_error: impl Into<String>) -> Self {
        Self::failed(status::NOT_FOUND, code, technical_error, user_error)
    }

    #[must_use]
    pub fn bad_request(code: impl Into<String>, technical_error: impl Into<String>, user_error: impl Into<String>) -> Self {
        Self::failed(status::BAD_REQUEST, code, technical_error, user_error)
    }

    #[must_use]
    pub fn internal_server_error(
        code: impl Into<String>,
        technical_error: impl Into<String>,
        user_error: impl Into<String>,
    ) -> Self {
        Self::failed(status::INTERNAL_SERVER_ERROR, code, technical_error, user_error)
    }

    /// The materialized value, if any.
    pub fn value(&self) -> Option<&T> {
        match &self.value {
            Some(Payload::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// The pending document, if the payload has not been materialized.
    #[must_use]
    pub fn document(&self) -> Option<&Document> {
        match &self.value {
            Some(Payload::Document(document)) => Some(document),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Payload<T>> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<T> {
        match self.value {
            Some(Payload::Value(value)) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    #[must_use]
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    #[must_use]
    pub fn meta(&self) -> &Metavalues {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut Metavalues {
        &mut self.meta
    }

    #[must_use]
    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    /// Mutable access to the error of a failed result. Never turns a success
    /// into a failure.
    pub fn error_mut(&mut self) -> Option<&mut TransportError> {
        self.error.as_mut()
    }

    #[must_use]
    pub fn serializer(&self) -> Option<&Arc<dyn Serializer>> {
        self.serializer.as_ref()
    }

    #[must_use]
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn set_serializer(&mut self, serializer: Arc<dyn Serializer>) -> &mut Self {
        self.serializer = Some(serializer);
        self
    }

    /// Binds `serializer` only if none is bound yet.
    pub fn bind_serializer_if_unset(&mut self, serializer: &Arc<dyn Serializer>) -> &mut Self {
        if self.serializer.is_none() {
            self.serializer = Some(Arc::clone(serializer));
        }
        self
    }

    pub fn set_meta(&mut self, meta: Metavalues) -> &mut Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Metavalues) -> Self {
        self.meta = meta;
        self
    }

    #[must_use]
    pub fn add_meta_value(mut self, value: Metavalue) -> Self {
        self.meta.push(value);
        self
    }

    #[must_use]
    pub fn add_meta_values(mut self, values: impl IntoIterator<Item = Metavalue>) -> Self {
        self.meta.extend(values);
        self
    }

    /// Same outcome, status, meta and error, without a payload.
    #[must_use]
    pub fn convert_to_empty<U>(self) -> TransportResult<U> {
        TransportResult::from_raw(None, self.status_code, self.meta, self.error, self.serializer)
    }

    fn codec(&self) -> Arc<dyn Serializer> {
        self.serializer.clone().unwrap_or_else(default_serializer)
    }

    fn conversion_failure<U>(
        error: &SerializationError,
        target: &'static str,
        meta: Metavalues,
        serializer: Option<Arc<dyn Serializer>>,
    ) -> TransportResult<U> {
        let mut failed = TransportResult::internal_server_error(
            codes::DESERIALIZE_ERROR,
            format!("{error}; target type {target}"),
            "",
        );
        failed.meta = meta;
        failed.serializer = serializer;
        failed
    }
}

impl<T: Serialize + 'static> TransportResult<T> {
    /// Re-types the result.
    ///
    /// A failure keeps status, meta and error and drops the payload. A success
    /// keeps status and meta and converts the payload: a pending document is
    /// materialized through the bound serializer (or the process default), a
    /// value that already is a `U` is moved across, anything else goes through
    /// the serializer's document form. A conversion error yields a 500
    /// [`codes::DESERIALIZE_ERROR`] result that still carries the meta.
    pub fn convert<U: DeserializeOwned + 'static>(self) -> TransportResult<U> {
        if self.error.is_some() {
            return self.convert_to_empty();
        }
        let codec = self.codec();
        let Self {
            value,
            status_code,
            meta,
            error,
            serializer,
        } = self;

        let converted = match value {
            None => Ok(None),
            Some(payload) => convert_payload::<T, U>(payload, codec.as_ref()).map(Some),
        };
        match converted {
            Ok(value) => TransportResult::from_raw(value.map(Payload::Value), status_code, meta, error, serializer),
            Err(err) => Self::conversion_failure(&err, type_name::<U>(), meta, serializer),
        }
    }

    /// Builds the wire envelope, rendering the payload as a document.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Encode`] if the payload cannot be represented.
    pub fn to_envelope(&self) -> Result<ResultEnvelope, SerializationError> {
        let value = match &self.value {
            None => None,
            Some(Payload::Document(document)) => Some(document.clone()),
            Some(Payload::Value(value)) => Some(self.codec().to_document(value)?),
        };
        Ok(ResultEnvelope {
            value,
            status_code: Some(self.status_code),
            success: Some(self.success()),
            meta: self.meta.clone(),
            error: self.error.clone(),
        })
    }

    /// Serializes the result envelope with the bound serializer.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::NotBound`] when no serializer has been
    /// bound, or any encode failure.
    pub fn serialize(&self) -> Result<String, SerializationError> {
        let serializer = self.serializer.as_ref().ok_or(SerializationError::NotBound)?;
        let envelope = self.to_envelope()?;
        serializer.serialize(&envelope)
    }
}

impl<T> TransportResult<T> {
    /// Rebuilds a result from its wire envelope.
    ///
    /// Missing fields are derived: without a status code the result is 500 if
    /// the envelope carries an error or `success: false`, otherwise 200. An
    /// envelope that signals failure in any way is a failure; if its status is
    /// in the success range it becomes 500, and if it has no error one with
    /// [`codes::UNKNOWN_ERROR`] is supplied. The payload of a success is kept
    /// as a pending document.
    #[must_use]
    pub fn from_envelope(envelope: ResultEnvelope, serializer: Option<Arc<dyn Serializer>>) -> Self {
        let ResultEnvelope {
            value,
            status_code,
            success,
            meta,
            error,
        } = envelope;

        let signals_failure = error.is_some() || success == Some(false);
        let status_code = status_code.unwrap_or(if signals_failure {
            status::INTERNAL_SERVER_ERROR
        } else {
            status::OK
        });

        if !signals_failure && is_success_status(status_code) {
            return Self::from_raw(value.map(Payload::Document), status_code, meta, None, serializer);
        }

        let status_code = if is_success_status(status_code) {
            status::INTERNAL_SERVER_ERROR
        } else {
            status_code
        };
        let error = error.unwrap_or_else(|| TransportError::new(codes::UNKNOWN_ERROR));
        Self::from_raw(None, status_code, meta, Some(error), serializer)
    }

    /// Parses a serialized result envelope and binds `serializer` to it.
    ///
    /// # Errors
    ///
    /// Returns [`SerializationError::Decode`] if `text` is not a result envelope.
    pub fn from_text(serializer: Arc<dyn Serializer>, text: &str) -> Result<Self, SerializationError> {
        let envelope: ResultEnvelope = serializer.deserialize(text)?;
        Ok(Self::from_envelope(envelope, Some(serializer)))
    }
}

impl<T: DeserializeOwned + 'static> TransportResult<T> {
    /// Turns a pending document into a `T` in place; on failure returns a 500
    /// result that keeps the meta and serializer.
    fn materialized(mut self) -> Self {
        match self.value.take() {
            Some(Payload::Document(document)) => match self.codec().from_document::<T>(document) {
                Ok(value) => {
                    self.value = Some(Payload::Value(value));
                    self
                }
                Err(err) => Self::conversion_failure(&err, type_name::<T>(), self.meta, self.serializer),
            },
            other => {
                self.value = other;
                self
            }
        }
    }
}

impl<T> TransportResult<T>
where
    T: Serialize + DeserializeOwned + Default + 'static,
{
    fn split_for_chaining<U>(self) -> Result<(T, Metavalues, Option<Arc<dyn Serializer>>), TransportResult<U>>
    where
        U: DeserializeOwned + 'static,
    {
        if self.error.is_some() {
            return Err(self.convert());
        }
        let this = self.materialized();
        if this.error.is_some() {
            return Err(this.convert_to_empty());
        }
        let value = match this.value {
            Some(Payload::Value(value)) => value,
            _ => T::default(),
        };
        Ok((value, this.meta, this.serializer))
    }

    /// Chains a fallible step onto a success.
    ///
    /// A failure short-circuits through [`convert`](Self::convert) without
    /// calling `f`. An empty success passes `T::default()`. An error returned
    /// by `f` is logged and becomes a 500 [`codes::MAYBE_EXCEPTION`] result.
    pub fn maybe<U, F>(self, f: F) -> TransportResult<U>
    where
        U: DeserializeOwned + 'static,
        F: FnOnce(T, &Metavalues) -> anyhow::Result<TransportResult<U>>,
    {
        let serializer = self.serializer.clone();
        self.try_maybe(f)
            .unwrap_or_else(|err| maybe_exception(&err, serializer))
    }

    /// Like [`maybe`](Self::maybe), but an error from `f` propagates.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns as an error.
    pub fn try_maybe<U, F>(self, f: F) -> anyhow::Result<TransportResult<U>>
    where
        U: DeserializeOwned + 'static,
        F: FnOnce(T, &Metavalues) -> anyhow::Result<TransportResult<U>>,
    {
        let (value, meta, serializer) = match self.split_for_chaining() {
            Ok(parts) => parts,
            Err(short_circuit) => return Ok(short_circuit),
        };
        let mut next = f(value, &meta)?;
        if let Some(serializer) = &serializer {
            next.bind_serializer_if_unset(serializer);
        }
        Ok(next)
    }

    /// Async form of [`maybe`](Self::maybe).
    pub async fn maybe_async<U, F, Fut>(self, f: F) -> TransportResult<U>
    where
        U: DeserializeOwned + 'static,
        F: FnOnce(T, Metavalues) -> Fut,
        Fut: Future<Output = anyhow::Result<TransportResult<U>>>,
    {
        let serializer = self.serializer.clone();
        match self.try_maybe_async(f).await {
            Ok(next) => next,
            Err(err) => maybe_exception(&err, serializer),
        }
    }

    /// Async form of [`try_maybe`](Self::try_maybe).
    ///
    /// # Errors
    ///
    /// Returns whatever the future returned by `f` resolves to as an error.
    pub async fn try_maybe_async<U, F, Fut>(self, f: F) -> anyhow::Result<TransportResult<U>>
    where
        U: DeserializeOwned + 'static,
        F: FnOnce(T, Metavalues) -> Fut,
        Fut: Future<Output = anyhow::Result<TransportResult<U>>>,
    {
        let (value, meta, serializer) = match self.split_for_chaining() {
            Ok(parts) => parts,
            Err(short_circuit) => return Ok(short_circuit),
        };
        let mut next = f(value, meta).await?;
        if let Some(serializer) = &serializer {
            next.bind_serializer_if_unset(serializer);
        }
        Ok(next)
    }

    /// Runs a check against a success without changing it.
    ///
    /// A failure is returned as is. If the check succeeds `self` is returned
    /// unchanged; if it fails, that failure is returned re-typed to `T`.
    /// Errors from `f` are handled as in [`maybe`](Self::maybe).
    pub fn maybe_pass_through<F>(self, f: F) -> Self
    where
        F: FnOnce(&T, &Metavalues) -> anyhow::Result<TransportResult<Document>>,
    {
        let serializer = self.serializer.clone();
        self.try_maybe_pass_through(f)
            .unwrap_or_else(|err| maybe_exception(&err, serializer))
    }

    /// Like [`maybe_pass_through`](Self::maybe_pass_through), but an error from
    /// `f` propagates.
    ///
    /// # Errors
    ///
    /// Returns whatever `f` returns as an error.
    pub fn try_maybe_pass_through<F>(self, f: F) -> anyhow::Result<Self>
    where
        F: FnOnce(&T, &Metavalues) -> anyhow::Result<TransportResult<Document>>,
    {
        if self.error.is_some() {
            return Ok(self);
        }
        let this = self.materialized();
        if this.error.is_some() {
            return Ok(this);
        }
        let fallback;
        let value = match &this.value {
            Some(Payload::Value(value)) => value,
            _ => {
                fallback = T::default();
                &fallback
            }
        };
        let verdict = f(value, &this.meta)?;
        if verdict.success() {
            Ok(this)
        } else {
            Ok(verdict.convert())
        }
    }
}

impl<T> TransportResult<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + 'static,
{
    /// Async form of [`maybe_pass_through`](Self::maybe_pass_through); the
    /// callback receives owned copies.
    pub async fn maybe_pass_through_async<F, Fut>(self, f: F) -> Self
    where
        F: FnOnce(T, Metavalues) -> Fut,
        Fut: Future<Output = anyhow::Result<TransportResult<Document>>>,
    {
        let serializer = self.serializer.clone();
        match self.try_maybe_pass_through_async(f).await {
            Ok(result) => result,
            Err(err) => maybe_exception(&err, serializer),
        }
    }

    /// # Errors
    ///
    /// Returns whatever the future returned by `f` resolves to as an error.
    pub async fn try_maybe_pass_through_async<F, Fut>(self, f: F) -> anyhow::Result<Self>
    where
        F: FnOnce(T, Metavalues) -> Fut,
        Fut: Future<Output = anyhow::Result<TransportResult<Document>>>,
    {
        if self.error.is_some() {
            return Ok(self);
        }
        let this = self.materialized();
        if this.error.is_some() {
            return Ok(this);
        }
        let value = this.value().cloned().unwrap_or_default();
        let verdict = f(value, this.meta.clone()).await?;
        if verdict.success() {
            Ok(this)
        } else {
            Ok(verdict.convert())
        }
    }
}

fn maybe_exception<U>(error: &anyhow::Error, serializer: Option<Arc<dyn Serializer>>) -> TransportResult<U> {
    tracing::error!(source = "TransportResult", error = %format!("{error:#}"), "chained callback failed");
    let mut failed = TransportResult::internal_server_error(codes::MAYBE_EXCEPTION, describe_failure(error), "");
    failed.serializer = serializer;
    failed
}

fn convert_payload<T, U>(payload: Payload<T>, codec: &dyn Serializer) -> Result<U, SerializationError>
where
    T: Serialize + 'static,
    U: DeserializeOwned + 'static,
{
    match payload {
        Payload::Document(document) => codec.from_document(document),
        Payload::Value(value) => {
            let mut slot = Some(value);
            let any: &mut dyn Any = &mut slot;
            if let Some(same) = any.downcast_mut::<Option<U>>().and_then(Option::take) {
                return Ok(same);
            }
            // `slot` is still `Some` here and serde writes it as the bare value.
            let document = codec.to_document(&slot)?;
            codec.from_document(document)
        }
    }
}
