//! The continuation token passed to middleware.

use crate::error::BoxError;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// A single-use continuation handed to a [`Middleware`](crate::handler::Middleware).
///
/// Calling [`Next::advance`] lets the pipeline run the following handler once
/// the middleware returns, [`Next::fail`] routes the request to the error
/// path instead. Both consume the token, so it can't be invoked twice.
/// A token that outlives its middleware (moved into a spawned task, for
/// example) is expired: invoking it afterwards has no effect.
pub struct Next {
    signal: Arc<Mutex<Signal>>,
}

#[derive(Debug, Default)]
pub(crate) enum Signal {
    #[default]
    Waiting,
    Advanced,
    Failed(BoxError),
    Expired,
}

impl Next {
    pub(crate) fn new() -> (Self, NextReceiver) {
        let signal = Arc::new(Mutex::new(Signal::Waiting));
        (Self { signal: Arc::clone(&signal) }, NextReceiver { signal })
    }

    /// Continue with the next handler.
    pub fn advance(self) {
        self.settle(Signal::Advanced);
    }

    /// Stop the pipeline and hand `error` to the error path.
    pub fn fail(self, error: impl Into<BoxError>) {
        self.settle(Signal::Failed(error.into()));
    }

    fn settle(self, signal: Signal) {
        let mut guard = self.signal.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if matches!(*guard, Signal::Expired) {
            debug!("continuation invoked after its middleware returned, ignored");
            return;
        }
        *guard = signal;
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// The pipeline's end of a [`Next`].
pub(crate) struct NextReceiver {
    signal: Arc<Mutex<Signal>>,
}

impl NextReceiver {
    /// Expires the token and returns what the middleware signalled.
    pub(crate) fn close(self) -> Signal {
        let mut guard = self.signal.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Signal::Expired)
    }
}
