//! Route table and path resolution.
//!
//! Routes are registered through a [`RouterBuilder`] and compiled once by
//! [`RouterBuilder::build`]. The built [`Router`] is frozen, requests only
//! read it.
//!
//! # Example
//!
//! ```
//! use micro_flow::HandlerResult;
//! use micro_flow::handler::step_fn;
//! use micro_flow::router::{Router, get};
//!
//! let router = Router::builder()
//!     .route(
//!         "/users/:id",
//!         get(step_fn(|_ctx, req, res| {
//!             Box::pin(async move {
//!                 res.text(format!("user {}", req.param("id").unwrap_or_default()))?;
//!                 HandlerResult::Ok(())
//!             })
//!         })),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert!(router.resolve(&http::Method::GET, "/users/42").is_some());
//! assert!(router.resolve(&http::Method::GET, "/users").is_none());
//! ```

pub mod pattern;

use crate::context::{Context, ContextInit};
use crate::error::RouterError;
use crate::feature::Feature;
use crate::filter::{self, Filter};
use crate::handler::Handler;
use crate::request::{PathParams, Request};
use http::Method;
use pattern::PathPattern;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Main router structure holding the compiled routes and global middleware.
pub struct Router {
    routes: Vec<Route>,
    by_method: HashMap<Method, Vec<usize>>,
    middleware: Vec<MiddlewareItem>,
}

/// A registered route: its method, compiled pattern and ordered handlers.
pub struct Route {
    method: Method,
    pattern: PathPattern,
    handlers: Vec<Handler>,
    context_init: Option<ContextInit>,
}

/// A global middleware and the filter deciding which requests it applies to.
pub struct MiddlewareItem {
    filter: Box<dyn Filter>,
    handler: Handler,
}

/// Result of a successful resolution.
pub struct RouteMatch<'router> {
    route: &'router Route,
    params: PathParams,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Finds the first route registered for `method` whose pattern matches `path`.
    ///
    /// `path` must not carry a query string. Segments are percent-decoded
    /// before being compared or bound.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        let indexes = self.by_method.get(method)?;
        let segments = pattern::decode_segments(path);

        indexes.iter().map(|&index| &self.routes[index]).find_map(|route| {
            route.pattern.matches(&segments).map(|params| RouteMatch { route, params })
        })
    }

    /// The global middleware applying to `req`, in registration order.
    pub fn middleware_for<'router>(&'router self, req: &Request) -> Vec<&'router Handler> {
        self.middleware.iter().filter(|item| item.filter.matches(req)).map(|item| &item.handler).collect()
    }

    /// Every registered `(method, pattern)` pair, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &PathPattern)> {
        self.routes.iter().map(|route| (&route.method, &route.pattern))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

impl Route {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /// Builds the initial context of a request matched by this route.
    pub fn init_context(&self, req: &Request) -> Context {
        self.context_init.as_ref().map(|init| init(req)).unwrap_or_default()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("handlers", &self.handlers)
            .finish()
    }
}

impl fmt::Debug for MiddlewareItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareItem").field("handler", &self.handler).finish_non_exhaustive()
    }
}

impl fmt::Debug for RouteMatch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch").field("route", &self.route).field("params", &self.params).finish()
    }
}

impl<'router> RouteMatch<'router> {
    pub fn route(&self) -> &'router Route {
        self.route
    }

    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_parts(self) -> (&'router Route, PathParams) {
        (self.route, self.params)
    }
}

struct Registration {
    method: Method,
    path: String,
    handlers: Vec<Handler>,
    context_init: Option<ContextInit>,
}

pub struct RouterBuilder {
    registrations: Vec<Registration>,
    middleware: Vec<MiddlewareItem>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self { registrations: vec![], middleware: vec![] }
    }

    /// Registers a route, [`RouterBuilder::build`] rejects it when the method already has a
    /// pattern of the same shape: `/users/:id` and `/users/:uid` are the same route.
    pub fn route(self, path: impl Into<String>, route_builder: RouteBuilder) -> Self {
        let RouteBuilder { method, handlers, context_init } = route_builder;
        self.push(Registration { method, path: path.into(), handlers, context_init })
    }

    /// Registers an ordered handler list for `method` and `path`.
    pub fn register(self, method: Method, path: impl Into<String>, handlers: Vec<Handler>) -> Self {
        self.push(Registration { method, path: path.into(), handlers, context_init: None })
    }

    /// Installs a feature as a route made of its steps.
    pub fn feature(self, feature: Feature) -> Self {
        let (method, path, handlers, context_init) = feature.into_parts();
        self.push(Registration { method, path, handlers, context_init })
    }

    /// Adds middleware running before the handlers of every matched route.
    pub fn middleware(self, handler: Handler) -> Self {
        self.middleware_when(filter::true_filter(), handler)
    }

    /// Adds middleware running for matched routes at or below `prefix`.
    pub fn middleware_at(self, prefix: impl Into<String>, handler: Handler) -> Self {
        self.middleware_when(filter::path_prefix(prefix), handler)
    }

    /// Adds middleware running for matched requests accepted by `filter`.
    pub fn middleware_when<F: Filter + 'static>(mut self, filter: F, handler: Handler) -> Self {
        self.middleware.push(MiddlewareItem { filter: Box::new(filter), handler });
        self
    }

    fn push(mut self, registration: Registration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Compiles every registered pattern into the frozen route table.
    ///
    /// Fails on the first invalid pattern, or when two registrations share a
    /// method and a pattern of the same shape.
    pub fn build(self) -> Result<Router, RouterError> {
        let mut routes: Vec<Route> = Vec::with_capacity(self.registrations.len());
        let mut by_method: HashMap<Method, Vec<usize>> = HashMap::new();

        for Registration { method, path, handlers, context_init } in self.registrations {
            let pattern = PathPattern::parse(&path)?;
            let indexes = by_method.entry(method.clone()).or_default();

            if indexes.iter().any(|&index| routes[index].pattern.same_shape(&pattern)) {
                return Err(RouterError::Conflict { method, pattern: path });
            }

            debug!(method = %method, pattern = %pattern, handlers = handlers.len(), "route registered");
            indexes.push(routes.len());
            routes.push(Route { method, pattern, handlers, context_init });
        }

        Ok(Router { routes, by_method, middleware: self.middleware })
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("registrations", &self.registrations.len())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}

/// A route under construction, created by the verb helpers such as [`get`].
pub struct RouteBuilder {
    method: Method,
    handlers: Vec<Handler>,
    context_init: Option<ContextInit>,
}

impl RouteBuilder {
    pub fn new(method: Method, handler: Handler) -> Self {
        Self { method, handlers: vec![handler], context_init: None }
    }

    /// Appends a handler running after the ones already added.
    pub fn then(mut self, handler: Handler) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Installs the initializer building each request's [`Context`].
    pub fn with_context<F>(mut self, init: F) -> Self
    where
        F: Fn(&Request) -> Context + Send + Sync + 'static,
    {
        self.context_init = Some(Arc::new(init));
        self
    }
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder").field("method", &self.method).field("handlers", &self.handlers).finish()
    }
}

macro_rules! method_router {
    ($method:ident, $upper_case_method:ident) => {
        #[doc = concat!("Starts a ", stringify!($upper_case_method), " route with `handler` as its first handler.")]
        pub fn $method(handler: Handler) -> RouteBuilder {
            RouteBuilder::new(Method::$upper_case_method, handler)
        }
    };
}

method_router!(get, GET);
method_router!(post, POST);
method_router!(put, PUT);
method_router!(delete, DELETE);
method_router!(head, HEAD);
method_router!(options, OPTIONS);
method_router!(connect, CONNECT);
method_router!(patch, PATCH);
method_router!(trace, TRACE);
