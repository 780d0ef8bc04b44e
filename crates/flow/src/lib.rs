//! The request dispatch core of a small web framework
//!
//! This crate resolves a request to a route, runs the route's ordered handlers
//! and guarantees the request is answered exactly once. It is transport
//! agnostic: a server hands requests to [`Dispatcher::dispatch`] and writes
//! back the returned `http::Response`.
//!
//! # Features
//!
//! - Literal and `:param` path patterns, first registered route wins
//! - Middleware `(request, response, next)` and steps `(context, request, response)`
//! - A per-request [`Context`] flowing through the steps of a route
//! - A response gate: a response operation that is still in flight blocks the
//!   next handler, a second response is discarded
//! - Error handlers, `404` and `500` fallbacks
//! - An in-process injection harness for tests
//!
//! # Example
//!
//! ```
//! use micro_flow::handler::{middleware_fn, step_fn};
//! use micro_flow::router::{Router, get};
//! use micro_flow::{Dispatcher, HandlerResult};
//!
//! #[tokio::main]
//! async fn main() {
//!     let router = Router::builder()
//!         .middleware(middleware_fn(|req, _res, next| {
//!             Box::pin(async move {
//!                 tracing::info!(path = req.path(), "incoming request");
//!                 next.advance();
//!                 HandlerResult::Ok(())
//!             })
//!         }))
//!         .route(
//!             "/users/:id",
//!             get(step_fn(|ctx, req, _res| {
//!                 Box::pin(async move {
//!                     ctx.insert("id", req.param("id").unwrap_or_default());
//!                     HandlerResult::Ok(())
//!                 })
//!             }))
//!             .then(step_fn(|ctx, _req, res| {
//!                 Box::pin(async move {
//!                     res.json(&ctx.get("id"))?;
//!                     HandlerResult::Ok(())
//!                 })
//!             })),
//!         );
//!
//!     let dispatcher = Dispatcher::builder().routes(router).build().unwrap();
//!     let response = dispatcher.inject().path("/users/42").send().await;
//!     assert_eq!(response.text(), r#""42""#);
//! }
//! ```

mod config;
mod context;
mod dispatcher;
mod error;
mod feature;
mod gate;
mod inject;
mod next;
mod query;
mod request;
mod response;

pub mod filter;
pub mod handler;
pub mod pipeline;
pub mod router;
pub mod view;

pub use config::DispatchConfig;
pub use context::Context;
pub use context::ContextInit;
pub use dispatcher::Dispatcher;
pub use dispatcher::DispatcherBuildError;
pub use dispatcher::DispatcherBuilder;
pub use error::BoxError;
pub use error::GateError;
pub use error::HandlerFailure;
pub use error::HandlerResult;
pub use error::ResponseError;
pub use error::RouterError;
pub use feature::Feature;
pub use gate::PendingResponse;
pub use gate::ResponseGate;
pub use inject::InjectResponse;
pub use inject::Injection;
pub use next::Next;
pub use query::parse_query;
pub use request::BodyError;
pub use request::PathParams;
pub use request::Request;
pub use response::Response;
pub use router::Router;
pub use view::ViewEngine;
