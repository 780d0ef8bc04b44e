//! Handler shapes.
//!
//! A pipeline is made of [`Handler`]s, a closed set of variants tagged when a
//! route is registered:
//! - [`Middleware`]: `(request, response, next)`, continues explicitly through [`Next`]
//! - [`Step`]: `(context, request, response)`, continues implicitly by returning
//!   `Ok(())` without having produced a response
//!
//! [`ErrorHandler`]s are not part of a pipeline, the dispatcher runs them when
//! a pipeline failed before any response was finished.

use crate::context::Context;
use crate::error::{HandlerFailure, HandlerResult};
use crate::next::Next;
use crate::request::Request;
use crate::response::Response;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: &mut Request, res: &Response, next: Next) -> HandlerResult;
}

#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, ctx: &mut Context, req: &Request, res: &Response) -> HandlerResult;
}

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Handles `failure`, usually by producing a response.
    ///
    /// Returning without producing one passes the failure on to the next error
    /// handler, and eventually to the default `500` response.
    async fn handle(&self, failure: &HandlerFailure, req: &Request, res: &Response) -> HandlerResult;
}

#[derive(Clone)]
pub enum Handler {
    Middleware(Arc<dyn Middleware>),
    Step(Arc<dyn Step>),
}

impl Handler {
    pub fn middleware(middleware: impl Middleware + 'static) -> Self {
        Handler::Middleware(Arc::new(middleware))
    }

    pub fn step(step: impl Step + 'static) -> Self {
        Handler::Step(Arc::new(step))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Handler::Middleware(_) => "middleware",
            Handler::Step(_) => "step",
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// A closure acting as [`Middleware`], see [`middleware_fn`].
pub struct FnMiddleware<F> {
    f: F,
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

/// Lifts a closure into a middleware [`Handler`].
///
/// ```
/// use micro_flow::HandlerResult;
/// use micro_flow::handler::middleware_fn;
///
/// let logger = middleware_fn(|req, _res, next| {
///     Box::pin(async move {
///         tracing::info!(path = req.path(), "incoming request");
///         next.advance();
///         HandlerResult::Ok(())
///     })
/// });
/// ```
pub fn middleware_fn<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Request, &'a Response, Next) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Handler::middleware(FnMiddleware { f })
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Request, &'a Response, Next) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, req: &mut Request, res: &Response, next: Next) -> HandlerResult {
        (self.f)(req, res, next).await
    }
}

/// A closure acting as [`Step`], see [`step_fn`].
pub struct FnStep<F> {
    f: F,
}

impl<F> fmt::Debug for FnStep<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnStep").finish_non_exhaustive()
    }
}

/// Lifts a closure into a step [`Handler`].
///
/// ```
/// use micro_flow::HandlerResult;
/// use micro_flow::handler::step_fn;
///
/// let hello = step_fn(|_ctx, _req, res| {
///     Box::pin(async move {
///         res.text("hello world")?;
///         HandlerResult::Ok(())
///     })
/// });
/// ```
pub fn step_fn<F>(f: F) -> Handler
where
    F: for<'a> Fn(&'a mut Context, &'a Request, &'a Response) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Handler::step(FnStep { f })
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: for<'a> Fn(&'a mut Context, &'a Request, &'a Response) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn run(&self, ctx: &mut Context, req: &Request, res: &Response) -> HandlerResult {
        (self.f)(ctx, req, res).await
    }
}

/// A closure acting as [`ErrorHandler`], see [`error_fn`].
pub struct FnErrorHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnErrorHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnErrorHandler").finish_non_exhaustive()
    }
}

/// Lifts a closure into an [`ErrorHandler`].
pub fn error_fn<F>(f: F) -> FnErrorHandler<F>
where
    F: for<'a> Fn(&'a HandlerFailure, &'a Request, &'a Response) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    FnErrorHandler { f }
}

#[async_trait]
impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: for<'a> Fn(&'a HandlerFailure, &'a Request, &'a Response) -> BoxFuture<'a, HandlerResult> + Send + Sync,
{
    async fn handle(&self, failure: &HandlerFailure, req: &Request, res: &Response) -> HandlerResult {
        (self.f)(failure, req, res).await
    }
}
