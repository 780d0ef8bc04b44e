//! In-process request injection.
//!
//! Drives a [`Dispatcher`] without any transport, the way tests and tools
//! exercise routes:
//!
//! ```
//! # async fn demo(dispatcher: micro_flow::Dispatcher) {
//! let response = dispatcher.inject().path("/users/42").header("x-request-id", "7").send().await;
//! assert_eq!(response.status, http::StatusCode::OK);
//! println!("{}", response.text());
//! # }
//! ```

use crate::dispatcher::Dispatcher;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::fmt;
use tracing::warn;

/// A request under construction, defaults to `GET /` without headers or payload.
pub struct Injection<'a> {
    dispatcher: &'a Dispatcher,
    method: Method,
    path: String,
    headers: HeaderMap,
    payload: Bytes,
}

impl fmt::Debug for Injection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injection")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

impl<'a> Injection<'a> {
    pub(crate) fn new(dispatcher: &'a Dispatcher) -> Self {
        Self { dispatcher, method: Method::GET, path: "/".to_string(), headers: HeaderMap::new(), payload: Bytes::new() }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// The request target, a path optionally followed by a query string.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Appends a header, invalid names or values are skipped with a warning.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        let name = <HeaderName as TryFrom<K>>::try_from(name).map_err(Into::<http::Error>::into);
        let value = <HeaderValue as TryFrom<V>>::try_from(value).map_err(Into::<http::Error>::into);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) | (_, Err(e)) => warn!(cause = %e, "skipping invalid injected header"),
        }
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Serializes `value` as the payload and sets `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(payload) => {
                self.payload = Bytes::from(payload);
                self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime::APPLICATION_JSON.as_ref()));
            }
            Err(e) => warn!(cause = %e, "failed to serialize injected payload"),
        }
        self
    }

    pub async fn send(self) -> InjectResponse {
        let response = self.dispatcher.dispatch(self.method, &self.path, self.headers, self.payload).await;
        let (parts, payload) = response.into_parts();
        InjectResponse { status: parts.status, headers: parts.headers, payload }
    }
}

/// The response an [`Injection`] produced.
#[derive(Debug, Clone)]
pub struct InjectResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub payload: Bytes,
}

impl InjectResponse {
    /// The payload as text, invalid UTF-8 is replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}
