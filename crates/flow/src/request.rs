//! Request handling module that provides access to the request a pipeline runs for.
//!
//! This module contains the request-side types handlers work with:
//! - `Request`: the decoded path, bound path parameters, parsed query, headers and body
//! - `PathParams`: the parameters bound by the matched route pattern

use crate::query::parse_query;
use bytes::Bytes;
use http::{HeaderMap, Method, header};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use thiserror::Error;

/// The request handed to every handler of a pipeline.
///
/// Middleware receives it mutably, so it can attach derived data through
/// [`Request::extensions_mut`] before the route's own steps run.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    raw_query: Option<String>,
    query: HashMap<String, String>,
    path_params: PathParams,
    headers: HeaderMap,
    body: Bytes,
    extensions: http::Extensions,
}

impl Request {
    /// Creates a request from its already decoded parts.
    ///
    /// `path` is the decoded path without query string, `raw_query` the query
    /// string as received, it is parsed eagerly.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        raw_query: Option<&str>,
        path_params: PathParams,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let query = raw_query.map(parse_query).unwrap_or_default();
        Self {
            method,
            path: path.into(),
            raw_query: raw_query.map(str::to_string),
            query,
            path_params,
            headers,
            body,
            extensions: http::Extensions::new(),
        }
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the percent-decoded request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string, without the leading `?`
    pub fn raw_query(&self) -> Option<&str> {
        self.raw_query.as_deref()
    }

    /// Returns the parsed query string
    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Returns a single query value by key
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Deserializes the query string into `T`, nested keys such as `a[b]=1` included
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        serde_qs::from_str::<T>(self.raw_query.as_deref().unwrap_or_default())
            .map_err(|e| BodyError::Query { reason: e.to_string() })
    }

    /// Returns a reference to the path parameters bound by the matched route
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Returns a single path parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name)
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the raw request body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as utf-8 text
    pub fn text(&self) -> Result<&str, BodyError> {
        std::str::from_utf8(&self.body).map_err(|_| BodyError::NotUtf8)
    }

    /// Deserializes a `application/json` body
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        self.expect_content_type(&mime::APPLICATION_JSON)?;
        serde_json::from_slice(&self.body).map_err(|e| BodyError::Json { reason: e.to_string() })
    }

    /// Deserializes a `application/x-www-form-urlencoded` body
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, BodyError> {
        self.expect_content_type(&mime::APPLICATION_WWW_FORM_URLENCODED)?;
        serde_urlencoded::from_bytes(&self.body).map_err(|e| BodyError::Form { reason: e.to_string() })
    }

    pub fn extensions(&self) -> &http::Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut http::Extensions {
        &mut self.extensions
    }

    fn expect_content_type(&self, expected: &mime::Mime) -> Result<(), BodyError> {
        let content_type = self
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok());

        match content_type {
            Some(mime) if mime.essence_str() == expected.essence_str() => Ok(()),
            _ => Err(BodyError::UnexpectedContentType { expected: expected.essence_str().to_string() }),
        }
    }
}

#[derive(Error, Debug)]
pub enum BodyError {
    #[error("request body is not utf8")]
    NotUtf8,

    #[error("expect content type '{expected}'")]
    UnexpectedContentType { expected: String },

    #[error("invalid json body: {reason}")]
    Json { reason: String },

    #[error("invalid form body: {reason}")]
    Form { reason: String },

    #[error("invalid query string: {reason}")]
    Query { reason: String },
}

/// Represents path parameters extracted from the URL path of an HTTP request.
///
/// Path parameters are named segments in the route pattern, for example in
/// `/users/:id`, `id` is a path parameter. Values are always strings, even
/// when they look numeric.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    /// Creates an empty PathParams instance with no parameters
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: String, value: String) {
        self.params.push((name, value));
    }

    /// Returns true if there are no path parameters
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Returns the number of path parameters
    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name
    #[inline]
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.params.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    /// Iterates over `(name, value)` pairs in pattern order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::{BodyError, PathParams, Request};
    use bytes::Bytes;
    use http::{HeaderMap, HeaderValue, Method, header};
    use serde::Deserialize;

    #[derive(Deserialize, Debug, PartialEq)]
    struct User {
        name: String,
        zip: String,
    }

    fn request(content_type: &'static str, body: &'static str) -> Request {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Request::new(Method::POST, "/users", Some("page=2&tag=a"), PathParams::empty(), headers, Bytes::from(body))
    }

    #[test]
    fn test_query_accessors() {
        let req = request("text/plain", "");
        assert_eq!(req.raw_query(), Some("page=2&tag=a"));
        assert_eq!(req.query_value("page"), Some("2"));
        assert_eq!(req.query().len(), 2);
    }

    #[test]
    fn test_query_as() {
        #[derive(Deserialize)]
        struct Paging {
            page: u32,
        }

        let req = request("text/plain", "");
        let paging: Paging = req.query_as().unwrap();
        assert_eq!(paging.page, 2);
    }

    #[test]
    fn test_json_body() {
        let req = request("application/json; charset=utf-8", r#"{"name":"hello","zip":"world"}"#);
        let user: User = req.json().unwrap();
        assert_eq!(user, User { name: "hello".into(), zip: "world".into() });
        assert!(matches!(req.form::<User>(), Err(BodyError::UnexpectedContentType { .. })));
    }

    #[test]
    fn test_form_body() {
        let req = request("application/x-www-form-urlencoded", "name=hello&zip=world");
        let user: User = req.form().unwrap();
        assert_eq!(user, User { name: "hello".into(), zip: "world".into() });
    }

    #[test]
    fn test_invalid_json_body() {
        let req = request("application/json", "{");
        assert!(matches!(req.json::<User>(), Err(BodyError::Json { .. })));
    }

    #[test]
    fn test_path_params_keep_order() {
        let mut params = PathParams::empty();
        params.insert("userId".into(), "123".into());
        params.insert("postId".into(), "456".into());
        assert_eq!(params.iter().collect::<Vec<_>>(), vec![("userId", "123"), ("postId", "456")]);
        assert_eq!(params.get("postId"), Some("456"));
        assert_eq!(params.get("missing"), None);
    }
}
