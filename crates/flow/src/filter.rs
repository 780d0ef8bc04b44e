//! Request filters that scope global middleware.
//!
//! This module implements a filter system that allows you to:
//! - Apply middleware below a path prefix only
//! - Apply middleware to some HTTP methods or when a header is present
//! - Combine multiple filters using AND/OR logic
//! - Create custom filters using closures
//!
//! ## Thread Safety
//!
//! All filters must implement the `Filter` trait, which requires `Send + Sync`.
//! The route table holding them is shared by every in-flight request.
//!
//! # Examples
//!
//! ```
//! use micro_flow::filter::{all_filter, get_method, header, path_prefix};
//!
//! // Matches GET requests below /api carrying an api key
//! let mut combined = all_filter();
//! combined.and(path_prefix("/api")).and(get_method()).and(header("x-api-key", "secret"));
//! ```

use crate::request::Request;
use http::{HeaderName, HeaderValue, Method};
use std::fmt;

/// Core trait for request filtering.
///
/// Implementors decide, per request, whether a scoped middleware applies.
/// Filters can be composed using [`AllFilter`] and [`AnyFilter`].
pub trait Filter: Send + Sync {
    /// Returns `true` if the request matches this filter's criteria.
    fn matches(&self, req: &Request) -> bool;
}

/// A filter that wraps a closure.
struct FnFilter<F: Fn(&Request) -> bool>(F);

impl<F: Fn(&Request) -> bool + Send + Sync> Filter for FnFilter<F> {
    fn matches(&self, req: &Request) -> bool {
        (self.0)(req)
    }
}

/// Creates a new filter from a closure.
///
/// # Example
/// ```
/// use micro_flow::filter::fn_filter;
///
/// let custom_filter = fn_filter(|req| req.query().contains_key("debug"));
/// ```
pub fn fn_filter<F>(f: F) -> impl Filter
where
    F: Fn(&Request) -> bool + Send + Sync,
{
    FnFilter(f)
}

/// Creates a filter that always returns true.
pub fn true_filter() -> TrueFilter {
    TrueFilter
}

/// A filter that always returns true.
#[derive(Debug, Clone, Copy)]
pub struct TrueFilter;
impl Filter for TrueFilter {
    #[inline]
    fn matches(&self, _req: &Request) -> bool {
        true
    }
}

/// Creates a new OR-composed filter chain.
pub fn any_filter() -> AnyFilter {
    AnyFilter::new()
}

/// Compose filters with OR logic.
///
/// If any inner filter succeeds, the whole filter succeeds.
/// An empty filter chain returns true by default.
pub struct AnyFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AnyFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    /// Add a new filter to the OR chain.
    pub fn or<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl fmt::Debug for AnyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyFilter").field("filters", &self.filters.len()).finish()
    }
}

impl Filter for AnyFilter {
    fn matches(&self, req: &Request) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|filter| filter.matches(req))
    }
}

/// Creates a new AND-composed filter chain.
pub fn all_filter() -> AllFilter {
    AllFilter::new()
}

/// Compose filters with AND logic.
///
/// All inner filters must succeed for the whole filter to succeed.
/// An empty filter chain returns true by default.
pub struct AllFilter {
    filters: Vec<Box<dyn Filter>>,
}

impl AllFilter {
    fn new() -> Self {
        Self { filters: vec![] }
    }

    /// Add a new filter to the AND chain.
    pub fn and<F: Filter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Box::new(filter));
        self
    }
}

impl fmt::Debug for AllFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AllFilter").field("filters", &self.filters.len()).finish()
    }
}

impl Filter for AllFilter {
    fn matches(&self, req: &Request) -> bool {
        self.filters.iter().all(|filter| filter.matches(req))
    }
}

/// A filter that matches HTTP methods.
#[derive(Debug, Clone)]
pub struct MethodFilter(Method);

impl Filter for MethodFilter {
    fn matches(&self, req: &Request) -> bool {
        self.0.eq(req.method())
    }
}

macro_rules! method_filter {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Creates a filter that matches HTTP ", stringify!($upper_case_method), " requests.")]
        #[inline]
        pub fn $method() -> MethodFilter {
            MethodFilter(Method::$upper_case_method)
        }
    };
}

method_filter!(get_method, GET);
method_filter!(post_method, POST);
method_filter!(put_method, PUT);
method_filter!(delete_method, DELETE);
method_filter!(patch_method, PATCH);

/// Creates a filter that matches a specific header name and value.
///
/// # Panics
/// Panics if `header_name` or `header_value` is not a valid header, filters
/// are built while the route table is assembled.
#[inline]
pub fn header<K, V>(header_name: K, header_value: V) -> HeaderFilter
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
{
    let name = <HeaderName as TryFrom<K>>::try_from(header_name)
        .map_err(Into::<http::Error>::into)
        .expect("invalid header name");
    let value = <HeaderValue as TryFrom<V>>::try_from(header_value)
        .map_err(Into::<http::Error>::into)
        .expect("invalid header value");
    HeaderFilter(name, value)
}

/// A filter that matches HTTP headers.
#[derive(Debug, Clone)]
pub struct HeaderFilter(HeaderName, HeaderValue);

impl Filter for HeaderFilter {
    fn matches(&self, req: &Request) -> bool {
        req.headers().get(&self.0).is_some_and(|value| self.1.eq(value))
    }
}

/// Creates a filter that matches paths at or below `prefix`.
///
/// Matching respects segment boundaries: `/api` matches `/api` and `/api/users`
/// but not `/apis`.
pub fn path_prefix(prefix: impl Into<String>) -> PathPrefixFilter {
    let prefix = prefix.into();
    let trimmed = prefix.trim_end_matches('/');
    PathPrefixFilter(trimmed.to_string())
}

/// A filter that matches a path prefix on segment boundaries.
#[derive(Debug, Clone)]
pub struct PathPrefixFilter(String);

impl Filter for PathPrefixFilter {
    fn matches(&self, req: &Request) -> bool {
        // an empty prefix is the root, which covers every path
        match req.path().strip_prefix(self.0.as_str()) {
            Some(rest) => self.0.is_empty() || rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}
