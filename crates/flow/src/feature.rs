//! Features bundle a route with the ordered steps implementing it.
//!
//! A feature is what a feature loader produces for one endpoint: a method, a
//! path, the steps to run and optionally the initializer of the per-request
//! [`Context`]. Install it with [`RouterBuilder::feature`](crate::router::RouterBuilder::feature).

use crate::context::{Context, ContextInit};
use crate::handler::Handler;
use crate::request::Request;
use http::Method;
use std::fmt;
use std::sync::Arc;

pub struct Feature {
    method: Method,
    path: String,
    steps: Vec<Handler>,
    context_init: Option<ContextInit>,
}

impl Feature {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), steps: vec![], context_init: None }
    }

    /// Appends a step, steps run in the order they were added.
    pub fn step(mut self, step: Handler) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = Handler>) -> Self {
        self.steps.extend(steps);
        self
    }

    pub fn with_context<F>(mut self, init: F) -> Self
    where
        F: Fn(&Request) -> Context + Send + Sync + 'static,
    {
        self.context_init = Some(Arc::new(init));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Method, String, Vec<Handler>, Option<ContextInit>) {
        (self.method, self.path, self.steps, self.context_init)
    }
}

impl fmt::Debug for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Feature")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Feature;
    use crate::context::Context;
    use crate::error::HandlerResult;
    use crate::handler::{Handler, step_fn};
    use crate::request::{PathParams, Request};
    use crate::router::Router;
    use bytes::Bytes;
    use http::{HeaderMap, Method};

    fn noop() -> Handler {
        step_fn(|_ctx, _req, _res| Box::pin(async { HandlerResult::Ok(()) }))
    }

    #[test]
    fn test_feature_becomes_route() {
        let feature = Feature::new(Method::POST, "/orders")
            .step(noop())
            .steps([noop(), noop()])
            .with_context(|_req| Context::from_iter([("source".to_string(), serde_json::json!("feature"))]));

        assert_eq!(feature.len(), 3);
        assert_eq!(feature.path(), "/orders");
        assert_eq!(feature.method(), &Method::POST);

        let router = Router::builder().feature(feature).build().unwrap();
        let route = router.resolve(&Method::POST, "/orders").unwrap().route();
        assert_eq!(route.handlers().len(), 3);

        let req = Request::new(Method::POST, "/orders", None, PathParams::empty(), HeaderMap::new(), Bytes::new());
        assert_eq!(route.init_context(&req).get("source"), Some(&serde_json::json!("feature")));
    }

    #[test]
    fn test_feature_conflicts_with_route() {
        let result = Router::builder()
            .feature(Feature::new(Method::GET, "/items/:id").step(noop()))
            .register(Method::GET, "/items/:item", vec![noop()])
            .build();
        assert!(result.is_err());
    }
}
