//! The response completion gate.
//!
//! Every request owns one [`ResponseGate`]. It is the single source of truth
//! for "may the pipeline run another handler". A handler can issue a
//! response-producing operation (a render, a file send) and return before that
//! operation resolves. Such an operation registers itself here as a
//! [`PendingResponse`] at the moment it is issued, and the pipeline awaits that
//! exact operation through [`ResponseGate::settle`] before it looks at the
//! flags again.

use crate::error::{GateError, ResponseError};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use tracing::warn;

#[derive(Default)]
pub struct ResponseGate {
    started: AtomicBool,
    finished: AtomicBool,
    pending: Mutex<Option<PendingResponse>>,
}

impl ResponseGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the response as started, calling it again is a no-op.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::Release);
    }

    /// Marks the response as finished.
    ///
    /// Fails with [`GateError::DoubleFinish`] if it already was, the state is left untouched.
    pub fn mark_finished(&self) -> Result<(), GateError> {
        self.started.store(true, Ordering::Release);
        match self.finished.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Ok(()),
            Err(_) => Err(GateError::DoubleFinish),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Claims the right to produce the response, only the first caller wins.
    pub(crate) fn claim(&self) -> bool {
        self.started.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Registers the operation that is producing the response.
    pub(crate) fn track(&self, pending: PendingResponse) {
        let mut guard = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if guard.replace(pending).is_some() {
            warn!("a pending response operation was replaced before it settled");
        }
    }

    /// Returns true if an operation is registered and has not been settled yet.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).is_some()
    }

    /// Waits for the tracked response operation, if any, and returns its outcome.
    ///
    /// The lock is released before awaiting, the operation itself may need it
    /// to commit into the response.
    pub async fn settle(&self) -> Result<(), ResponseError> {
        let pending = self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        match pending {
            Some(pending) => pending.await,
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ResponseGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseGate")
            .field("started", &self.is_started())
            .field("finished", &self.is_finished())
            .field("pending", &self.has_pending())
            .finish()
    }
}

/// A handle to an in-flight response operation.
///
/// Cloning is cheap and every clone resolves to the same outcome, so the
/// handler that issued the operation may await it while the pipeline does too.
#[derive(Clone)]
#[must_use = "the operation completes when awaited, the pipeline awaits it anyway"]
pub struct PendingResponse {
    inner: Shared<BoxFuture<'static, Result<(), ResponseError>>>,
}

impl PendingResponse {
    pub(crate) fn new<F>(operation: F) -> Self
    where
        F: Future<Output = Result<(), ResponseError>> + Send + 'static,
    {
        Self { inner: operation.boxed().shared() }
    }

    /// Returns the outcome if the operation already completed.
    pub fn peek(&self) -> Option<&Result<(), ResponseError>> {
        self.inner.peek()
    }
}

impl Future for PendingResponse {
    type Output = Result<(), ResponseError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx)
    }
}

impl fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingResponse").field("settled", &self.peek().is_some()).finish()
    }
}
