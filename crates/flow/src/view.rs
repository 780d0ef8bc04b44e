//! The view engine interface used by [`Response::render`](crate::Response::render).
//!
//! Templating itself lives outside this crate, an engine only has to turn a
//! view name and its data into markup, asynchronously.

use crate::error::BoxError;
use futures::future::BoxFuture;
use serde_json::Value;

#[cfg_attr(test, mockall::automock)]
pub trait ViewEngine: Send + Sync {
    /// Renders `view` with `data`.
    ///
    /// The returned future must not borrow from the engine, it is driven after
    /// the handler that issued the render has returned.
    fn render(&self, view: &str, data: &Value) -> BoxFuture<'static, Result<String, BoxError>>;
}
