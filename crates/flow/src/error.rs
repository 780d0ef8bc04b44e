//! Error types shared across the dispatch core.
//!
//! Handlers report failures with [`BoxError`], the same currency the rest of the
//! framework uses. Everything the core itself can fail with is a dedicated
//! `thiserror` enum:
//!
//! - [`RouterError`]: raised while building the route table, fatal at startup
//! - [`GateError`]: a second completion of an already finished response
//! - [`ResponseError`]: a response-producing operation could not complete
//! - [`HandlerFailure`]: a handler errored, panicked or its response operation failed

use http::Method;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;

/// The error type handlers return.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// The result type of every handler invocation.
pub type HandlerResult = Result<(), BoxError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    #[error("route {method} {pattern} is already registered")]
    Conflict { method: Method, pattern: String },

    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate parameter ':{name}' in route pattern '{pattern}'")]
    DuplicateParam { pattern: String, name: String },
}

impl RouterError {
    pub fn invalid_pattern<S: ToString>(pattern: &str, reason: S) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("response has already been finished")]
    DoubleFinish,
}

/// Failure of a response-producing operation.
///
/// Cloneable because the outcome of a pending operation is observed by both
/// the handler that issued it and the pipeline.
#[derive(Error, Debug, Clone)]
pub enum ResponseError {
    #[error("response has already been started, the second response is discarded")]
    AlreadyStarted,

    #[error("response gate rejected completion: {source}")]
    Gate {
        #[from]
        source: GateError,
    },

    #[error("failed to serialize response body: {reason}")]
    Serialize { reason: String },

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("no view engine is configured, can't render '{view}'")]
    NoViewEngine { view: String },

    #[error("response operation failed: {source}")]
    Operation { source: Arc<dyn Error + Send + Sync> },

    #[error("response operation panicked: {message}")]
    Panicked { message: String },
}

impl ResponseError {
    pub fn operation(e: BoxError) -> Self {
        Self::Operation { source: Arc::from(e) }
    }

    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }
}

/// Why a pipeline stopped without producing a response normally.
#[derive(Error, Debug)]
pub enum HandlerFailure {
    #[error("handler #{index} failed: {source}")]
    Error { index: usize, source: BoxError },

    #[error("handler #{index} panicked: {message}")]
    Panicked { index: usize, message: String },

    #[error("response operation issued by handler #{index} failed: {source}")]
    Response { index: usize, source: ResponseError },
}

impl HandlerFailure {
    /// Position of the failing handler within the pipeline.
    pub fn index(&self) -> usize {
        match self {
            HandlerFailure::Error { index, .. }
            | HandlerFailure::Panicked { index, .. }
            | HandlerFailure::Response { index, .. } => *index,
        }
    }
}
