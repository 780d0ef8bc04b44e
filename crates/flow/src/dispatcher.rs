//! Request dispatch: route resolution, pipeline execution and recovery.
//!
//! The [`Dispatcher`] is the entry point a transport calls once per request.
//! It answers every request with exactly one response:
//! - `404` when no route matches
//! - the response a handler produced
//! - the response an [`ErrorHandler`] produced, or `500`, when a handler failed
//! - a configurable fallback when the handlers finished without responding

use crate::config::DispatchConfig;
use crate::error::{HandlerFailure, RouterError};
use crate::handler::{ErrorHandler, Handler};
use crate::inject::Injection;
use crate::pipeline::{self, Outcome};
use crate::request::Request;
use crate::response::Response;
use crate::router::pattern::percent_decode;
use crate::router::{Router, RouterBuilder};
use crate::view::ViewEngine;
use bytes::Bytes;
use futures::FutureExt;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

const INTERNAL_SERVER_ERROR_BODY: &str = "500 internal server error";

enum RouterSource {
    Built(Router),
    Builder(RouterBuilder),
}

pub struct DispatcherBuilder {
    router: Option<RouterSource>,
    config: DispatchConfig,
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    view_engine: Option<Arc<dyn ViewEngine>>,
}

impl DispatcherBuilder {
    fn new() -> Self {
        Self { router: None, config: DispatchConfig::default(), error_handlers: vec![], view_engine: None }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(RouterSource::Built(router));
        self
    }

    /// Uses routes that are compiled by [`DispatcherBuilder::build`].
    pub fn routes(mut self, router_builder: RouterBuilder) -> Self {
        self.router = Some(RouterSource::Builder(router_builder));
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Appends an error handler, error handlers run in registration order.
    pub fn error_handler(mut self, error_handler: impl ErrorHandler + 'static) -> Self {
        self.error_handlers.push(Arc::new(error_handler));
        self
    }

    pub fn view_engine(mut self, view_engine: impl ViewEngine + 'static) -> Self {
        self.view_engine = Some(Arc::new(view_engine));
        self
    }

    pub fn build(self) -> Result<Dispatcher, DispatcherBuildError> {
        let router = match self.router.ok_or(DispatcherBuildError::MissingRouter)? {
            RouterSource::Built(router) => router,
            RouterSource::Builder(builder) => builder.build()?,
        };

        Ok(Dispatcher {
            router: Arc::new(router),
            config: self.config,
            error_handlers: self.error_handlers,
            view_engine: self.view_engine,
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("config", &self.config)
            .field("error_handlers", &self.error_handlers.len())
            .field("view_engine", &self.view_engine.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Error, Debug)]
pub enum DispatcherBuildError {
    #[error("router must be set")]
    MissingRouter,
    #[error("invalid routes: {source}")]
    Router {
        #[from]
        source: RouterError,
    },
}

/// Dispatches requests through a frozen [`Router`].
///
/// Cheap to clone and `Send + Sync`, a single dispatcher serves concurrent
/// requests from any number of tasks.
#[derive(Clone)]
pub struct Dispatcher {
    router: Arc<Router>,
    config: DispatchConfig,
    error_handlers: Vec<Arc<dyn ErrorHandler>>,
    view_engine: Option<Arc<dyn ViewEngine>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("router", &self.router)
            .field("config", &self.config)
            .field("error_handlers", &self.error_handlers.len())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Starts building an in-process request, see [`Injection`].
    pub fn inject(&self) -> Injection<'_> {
        Injection::new(self)
    }

    /// Dispatches an `http::Request`, the adapter transports use.
    pub async fn dispatch_http(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        let (parts, body) = req.into_parts();
        let target = parts.uri.path_and_query().map(|target| target.as_str()).unwrap_or("/");
        self.dispatch(parts.method, target, parts.headers, body).await
    }

    /// Dispatches one request and returns its response.
    ///
    /// `target` is the request path, optionally followed by `?` and the query.
    pub async fn dispatch(&self, method: Method, target: &str, headers: HeaderMap, body: Bytes) -> http::Response<Bytes> {
        let (path, raw_query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };

        let Some(route_match) = self.router.resolve(&method, path) else {
            debug!(method = %method, path, "no route matched");
            return self.not_found();
        };
        let (route, params) = route_match.into_parts();

        let mut req = Request::new(method, percent_decode(path), raw_query, params, headers, body);
        let res = Response::with_view_engine(self.view_engine.clone());
        let mut ctx = route.init_context(&req);

        let handlers: Vec<&Handler> = self.router.middleware_for(&req).into_iter().chain(route.handlers()).collect();
        debug!(method = %req.method(), path = req.path(), pattern = %route.pattern(), handlers = handlers.len(), "dispatching");

        match pipeline::run(&handlers, &mut ctx, &mut req, &res).await {
            Outcome::Failed(failure) => self.handle_failure(failure, &req, &res).await,
            Outcome::Responded if res.is_finished() => {}
            outcome => self.handle_unterminated(&outcome, &req, &res),
        }

        res.take_http()
    }

    fn not_found(&self) -> http::Response<Bytes> {
        let res = Response::new();
        if let Err(e) = res.recover(StatusCode::NOT_FOUND, self.config.not_found_body.clone()) {
            error!(cause = %e, "failed to build the not found response");
        }
        res.take_http()
    }

    /// A finished response is kept as is. A started but unfinished one has no body to keep, error
    /// handlers can't claim it and it is overwritten with a `500`.
    async fn handle_failure(&self, failure: HandlerFailure, req: &Request, res: &Response) {
        if res.is_finished() {
            error!(method = %req.method(), path = req.path(), cause = %failure, "handler failed after the response was sent");
            return;
        }
        error!(method = %req.method(), path = req.path(), cause = %failure, "handler failed");

        for (index, error_handler) in self.error_handlers.iter().enumerate() {
            if res.is_started() {
                break;
            }

            match AssertUnwindSafe(error_handler.handle(&failure, req, res)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(index, cause = %e, "error handler failed"),
                Err(_) => warn!(index, "error handler panicked"),
            }

            if let Err(e) = res.gate().settle().await {
                warn!(index, cause = %e, "response operation of an error handler failed");
            }
        }

        if !res.is_finished() {
            let body = if self.config.expose_errors {
                format!("{INTERNAL_SERVER_ERROR_BODY}: {failure}")
            } else {
                INTERNAL_SERVER_ERROR_BODY.to_string()
            };
            if let Err(e) = res.recover(StatusCode::INTERNAL_SERVER_ERROR, body) {
                error!(cause = %e, "failed to build the error response");
            }
        }
    }

    fn handle_unterminated(&self, outcome: &Outcome, req: &Request, res: &Response) {
        error!(
            method = %req.method(),
            path = req.path(),
            outcome = ?outcome,
            "no handler produced a response, check the route's handlers"
        );

        let status = self.config.unterminated_status();
        let body = format!("no response was produced for {} {}", req.method(), req.path());
        if let Err(e) = res.recover(status, body) {
            error!(cause = %e, "failed to build the fallback response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Dispatcher, DispatcherBuildError};
    use crate::config::DispatchConfig;
    use crate::error::{BoxError, HandlerResult};
    use crate::handler::{error_fn, middleware_fn, step_fn};
    use crate::router::{Router, get};
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_dispatcher_is_send_sync() {
        assert_send_sync::<Dispatcher>();
    }

    #[test]
    fn test_missing_router() {
        assert!(matches!(Dispatcher::builder().build(), Err(DispatcherBuildError::MissingRouter)));
    }

    #[test]
    fn test_route_errors_are_fatal() {
        let routes = Router::builder()
            .route("/a", get(step_fn(|_ctx, _req, _res| Box::pin(async { HandlerResult::Ok(()) }))))
            .route("/a/", get(step_fn(|_ctx, _req, _res| Box::pin(async { HandlerResult::Ok(()) }))));
        assert!(matches!(Dispatcher::builder().routes(routes).build(), Err(DispatcherBuildError::Router { .. })));
    }

    #[tokio::test]
    async fn test_not_found() {
        let config = DispatchConfig { not_found_body: "nope".to_string(), ..DispatchConfig::default() };
        let user = step_fn(|_ctx, _req, res| {
            Box::pin(async move {
                res.text("user")?;
                HandlerResult::Ok(())
            })
        });
        let dispatcher = Dispatcher::builder()
            .routes(Router::builder().route("/users/:id", get(user)))
            .config(config)
            .build()
            .unwrap();

        let response = dispatcher.dispatch(Method::GET, "/users", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), &Bytes::from("nope"));

        let response = dispatcher.dispatch(Method::POST, "/users/1", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = dispatcher.dispatch(Method::GET, "/users/1?x=1", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_handler_produces_response() {
        let dispatcher = Dispatcher::builder()
            .routes(Router::builder().route(
                "/fail",
                get(step_fn(|_ctx, _req, _res| Box::pin(async { Err::<(), BoxError>("invalid input".into()) }))),
            ))
            .error_handler(error_fn(|_failure, _req, _res| Box::pin(async { HandlerResult::Ok(()) })))
            .error_handler(error_fn(|failure, _req, res| {
                Box::pin(async move {
                    res.status(StatusCode::BAD_REQUEST).text(format!("rejected: {}", failure.index()))?;
                    HandlerResult::Ok(())
                })
            }))
            .build()
            .unwrap();

        let response = dispatcher.dispatch(Method::GET, "/fail", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), &Bytes::from("rejected: 0"));
    }

    #[tokio::test]
    async fn test_exposed_errors() {
        let config = DispatchConfig { expose_errors: true, ..DispatchConfig::default() };
        let dispatcher = Dispatcher::builder()
            .routes(Router::builder().route(
                "/fail",
                get(step_fn(|_ctx, _req, _res| Box::pin(async { Err::<(), BoxError>("invalid input".into()) }))),
            ))
            .config(config)
            .build()
            .unwrap();

        let response = dispatcher.dispatch(Method::GET, "/fail", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), &Bytes::from("500 internal server error: handler #0 failed: invalid input"));
    }

    #[tokio::test]
    async fn test_halted_middleware_gets_fallback() {
        let config = DispatchConfig { unterminated_status: 503, ..DispatchConfig::default() };
        let dispatcher = Dispatcher::builder()
            .routes(
                Router::builder()
                    .middleware(middleware_fn(|_req, _res, _next| Box::pin(async { HandlerResult::Ok(()) })))
                    .route("/quiet", get(step_fn(|_ctx, _req, _res| Box::pin(async { HandlerResult::Ok(()) })))),
            )
            .config(config)
            .build()
            .unwrap();

        let response = dispatcher.dispatch(Method::GET, "/quiet", HeaderMap::new(), Bytes::new()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.body(), &Bytes::from("no response was produced for GET /quiet"));
    }

    #[tokio::test]
    async fn test_dispatch_http() {
        let dispatcher = Dispatcher::builder()
            .routes(Router::builder().route(
                "/echo",
                get(step_fn(|_ctx, req, res| {
                    Box::pin(async move {
                        res.text(req.query_value("q").unwrap_or_default().to_string())?;
                        HandlerResult::Ok(())
                    })
                })),
            ))
            .build()
            .unwrap();

        let request = http::Request::builder().uri("http://localhost/echo?q=hello+world").body(Bytes::new()).unwrap();
        let response = dispatcher.dispatch_http(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from("hello world"));
    }
}
