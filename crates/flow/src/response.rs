//! The per-request response object.
//!
//! A [`Response`] is a cheap handle over per-request state: status, headers,
//! body and the request's [`ResponseGate`]. Handlers mutate it through `&self`
//! and never replace it.
//!
//! Operations fall in two groups:
//! - mutators ([`Response::status`], [`Response::header`]) only touch the parts
//!   and are ignored once the response started;
//! - producers ([`Response::send`], [`Response::json`], [`Response::render`], ...)
//!   claim the gate. Synchronous producers finish the response right away,
//!   asynchronous ones register a [`PendingResponse`] with the gate before they
//!   return, which the pipeline awaits before it runs anything else.
//!
//! Only the first producer of a request wins, later attempts fail with
//! [`ResponseError::AlreadyStarted`] and leave the first response untouched.

use crate::error::{BoxError, ResponseError};
use crate::gate::{PendingResponse, ResponseGate};
use crate::pipeline::panic_message;
use crate::view::ViewEngine;
use bytes::Bytes;
use futures::FutureExt;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::warn;

#[derive(Clone)]
pub struct Response {
    inner: Arc<Inner>,
}

struct Inner {
    parts: Mutex<Parts>,
    gate: ResponseGate,
    view_engine: Option<Arc<dyn ViewEngine>>,
}

#[derive(Debug, Default)]
struct Parts {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Creates an unstarted response: status 200, no headers, empty body.
    pub fn new() -> Self {
        Self::with_view_engine(None)
    }

    pub(crate) fn with_view_engine(view_engine: Option<Arc<dyn ViewEngine>>) -> Self {
        let inner = Inner { parts: Mutex::new(Parts::default()), gate: ResponseGate::new(), view_engine };
        Self { inner: Arc::new(inner) }
    }

    /// The gate tracking whether this response has started or finished.
    pub fn gate(&self) -> &ResponseGate {
        &self.inner.gate
    }

    /// Returns true once any producing operation has been issued.
    pub fn is_started(&self) -> bool {
        self.inner.gate.is_started()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.gate.is_finished()
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().status
    }

    pub fn headers(&self) -> HeaderMap {
        self.parts().headers.clone()
    }

    pub fn header_value(&self, name: impl http::header::AsHeaderName) -> Option<HeaderValue> {
        self.parts().headers.get(name).cloned()
    }

    pub fn body(&self) -> Bytes {
        self.parts().body.clone()
    }

    /// Sets the status code, ignored once the response started.
    pub fn status(&self, status: StatusCode) -> &Self {
        if self.reject_mutation("status") {
            return self;
        }
        self.parts().status = status;
        self
    }

    /// Sets a header, replacing previous values. Ignored once the response started.
    pub fn header<K, V>(&self, name: K, value: V) -> Result<&Self, ResponseError>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = HeaderName::try_from(name).map_err(|e| ResponseError::invalid_header(Into::<http::Error>::into(e)))?;
        let value =
            HeaderValue::try_from(value).map_err(|e| ResponseError::invalid_header(Into::<http::Error>::into(e)))?;
        if !self.reject_mutation("header") {
            self.parts().headers.insert(name, value);
        }
        Ok(self)
    }

    /// Finishes the response with `body` as is.
    pub fn send(&self, body: impl Into<Bytes>) -> Result<(), ResponseError> {
        self.claim()?;
        self.commit(body.into())
    }

    /// Finishes the response with a `text/plain` body.
    pub fn text(&self, body: impl Into<String>) -> Result<(), ResponseError> {
        self.claim()?;
        self.set_content_type(&mime::TEXT_PLAIN_UTF_8);
        self.commit(Bytes::from(body.into()))
    }

    /// Finishes the response with a `text/html` body.
    pub fn html(&self, body: impl Into<String>) -> Result<(), ResponseError> {
        self.claim()?;
        self.set_content_type(&mime::TEXT_HTML_UTF_8);
        self.commit(Bytes::from(body.into()))
    }

    /// Serializes `value` and finishes the response with an `application/json` body.
    ///
    /// A value that can't be serialized leaves the response unstarted.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), ResponseError> {
        let body = serde_json::to_vec(value).map_err(|e| ResponseError::Serialize { reason: e.to_string() })?;
        self.claim()?;
        self.set_content_type(&mime::APPLICATION_JSON);
        self.commit(Bytes::from(body))
    }

    /// Finishes the response with `status` and its canonical reason as body.
    pub fn send_status(&self, status: StatusCode) -> Result<(), ResponseError> {
        self.claim()?;
        self.parts().status = status;
        self.set_content_type(&mime::TEXT_PLAIN_UTF_8);
        self.commit(Bytes::from_static(status.canonical_reason().unwrap_or_default().as_bytes()))
    }

    /// Redirects with `302 Found`.
    pub fn redirect(&self, location: &str) -> Result<(), ResponseError> {
        self.redirect_with(StatusCode::FOUND, location)
    }

    pub fn redirect_with(&self, status: StatusCode, location: &str) -> Result<(), ResponseError> {
        let value = HeaderValue::try_from(location).map_err(ResponseError::invalid_header)?;
        self.claim()?;
        {
            let mut parts = self.parts();
            parts.status = status;
            parts.headers.insert(header::LOCATION, value);
        }
        self.set_content_type(&mime::TEXT_PLAIN_UTF_8);
        let reason = status.canonical_reason().unwrap_or("Redirecting");
        self.commit(Bytes::from(format!("{reason}. Redirecting to {location}")))
    }

    /// Finishes the response without a body.
    pub fn end(&self) -> Result<(), ResponseError> {
        self.claim()?;
        self.commit(Bytes::new())
    }

    /// Starts the response now and finishes it with the output of `operation`.
    ///
    /// The operation is registered with the gate before this returns, the
    /// caller may await the returned handle or simply drop it: the pipeline
    /// will not run another handler until the operation settled. Headers
    /// such as the content type must be set before calling this.
    pub fn send_with<F, B>(&self, operation: F) -> Result<PendingResponse, ResponseError>
    where
        F: Future<Output = Result<B, BoxError>> + Send + 'static,
        B: Into<Bytes>,
    {
        self.claim()?;
        Ok(self.track_operation(operation))
    }

    /// Renders `view` with the configured [`ViewEngine`] into a `text/html` body.
    pub fn render<T: Serialize + ?Sized>(&self, view: &str, data: &T) -> Result<PendingResponse, ResponseError> {
        let Some(engine) = self.inner.view_engine.as_ref() else {
            return Err(ResponseError::NoViewEngine { view: view.to_string() });
        };
        let data = serde_json::to_value(data).map_err(|e| ResponseError::Serialize { reason: e.to_string() })?;
        self.claim()?;
        self.set_content_type(&mime::TEXT_HTML_UTF_8);
        Ok(self.track_operation(engine.render(view, &data)))
    }

    fn track_operation<F, B>(&self, operation: F) -> PendingResponse
    where
        F: Future<Output = Result<B, BoxError>> + Send + 'static,
        B: Into<Bytes>,
    {
        let inner = Arc::downgrade(&self.inner);
        let pending = PendingResponse::new(async move {
            let body = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result.map_err(ResponseError::operation)?,
                Err(payload) => return Err(ResponseError::Panicked { message: panic_message(payload.as_ref()) }),
            };
            match Weak::upgrade(&inner) {
                Some(inner) => Response { inner }.commit(body.into()),
                // the request is gone, nobody can observe the body
                None => Ok(()),
            }
        });
        self.inner.gate.track(pending.clone());
        pending
    }

    /// Replaces whatever was prepared with a plain text response and finishes it.
    ///
    /// Used by the dispatcher to answer requests nobody answered, fails if the
    /// response already finished.
    pub(crate) fn recover(&self, status: StatusCode, body: impl Into<String>) -> Result<(), ResponseError> {
        self.inner.gate.mark_finished()?;
        let mut parts = self.parts();
        parts.status = status;
        parts.headers.clear();
        parts.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime::TEXT_PLAIN_UTF_8.as_ref()));
        let body = Bytes::from(body.into());
        parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        parts.body = body;
        Ok(())
    }

    /// Moves the produced parts out into an `http::Response`.
    pub(crate) fn take_http(&self) -> http::Response<Bytes> {
        let parts = std::mem::take(&mut *self.parts());
        let mut response = http::Response::new(parts.body);
        *response.status_mut() = parts.status;
        *response.headers_mut() = parts.headers;
        response
    }

    fn claim(&self) -> Result<(), ResponseError> {
        if self.inner.gate.claim() {
            Ok(())
        } else {
            warn!("response has already been started, discarding the second response");
            Err(ResponseError::AlreadyStarted)
        }
    }

    fn commit(&self, body: Bytes) -> Result<(), ResponseError> {
        self.inner.gate.mark_finished().inspect_err(|e| warn!(cause = %e, "discarding response body"))?;
        let mut parts = self.parts();
        if !parts.headers.contains_key(header::CONTENT_LENGTH) {
            parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        parts.body = body;
        Ok(())
    }

    fn set_content_type(&self, mime: &mime::Mime) {
        let mut parts = self.parts();
        if !parts.headers.contains_key(header::CONTENT_TYPE)
            && let Ok(value) = HeaderValue::from_str(mime.as_ref())
        {
            parts.headers.insert(header::CONTENT_TYPE, value);
        }
    }

    fn reject_mutation(&self, what: &str) -> bool {
        let started = self.is_started();
        if started {
            warn!(what, "response has already been started, ignoring the change");
        }
        started
    }

    fn parts(&self) -> MutexGuard<'_, Parts> {
        self.inner.parts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self.parts();
        f.debug_struct("Response")
            .field("status", &parts.status)
            .field("headers", &parts.headers)
            .field("body_len", &parts.body.len())
            .field("gate", &self.inner.gate)
            .finish()
    }
}
