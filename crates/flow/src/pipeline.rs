//! Sequential execution of a request's handlers.
//!
//! Handlers run strictly one after another. Whether the next one may run is
//! decided by the response's [`ResponseGate`](crate::gate::ResponseGate) only,
//! never by the mere fact that a handler returned: after every handler the
//! pipeline first awaits the response operation that handler may have issued
//! without waiting for it, then looks at the gate.

use crate::context::Context;
use crate::error::{HandlerFailure, HandlerResult};
use crate::handler::Handler;
use crate::next::{Next, Signal};
use crate::request::Request;
use crate::response::Response;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// How a pipeline run ended.
#[derive(Debug)]
pub enum Outcome {
    /// A handler started the response, the handlers after it were skipped.
    Responded,
    /// Every handler continued and none of them produced a response.
    Exhausted,
    /// A middleware returned without continuing and without producing a response.
    Halted { index: usize },
    /// A handler failed, the handlers after it were skipped.
    Failed(HandlerFailure),
}

impl Outcome {
    pub fn is_responded(&self) -> bool {
        matches!(self, Outcome::Responded)
    }
}

/// What a single handler asked for.
enum Flow {
    Continue,
    Stop,
}

/// Runs `handlers` in order against one request.
pub async fn run(handlers: &[&Handler], ctx: &mut Context, req: &mut Request, res: &Response) -> Outcome {
    for (index, handler) in handlers.iter().enumerate() {
        if res.is_started() {
            debug!(index, "response already started, skipping remaining handlers");
            return Outcome::Responded;
        }

        let invoked = invoke(index, handler, ctx, req, res).await;

        // the handler may have issued a response operation without awaiting it
        let settled = res.gate().settle().await;

        let flow = match invoked {
            Ok(flow) => flow,
            Err(failure) => {
                if let Err(e) = settled {
                    warn!(index, cause = %e, "response operation of a failing handler failed as well");
                }
                return Outcome::Failed(failure);
            }
        };

        if let Err(source) = settled {
            return Outcome::Failed(HandlerFailure::Response { index, source });
        }

        if res.is_started() {
            debug!(index, kind = handler.kind(), "handler produced the response");
            return Outcome::Responded;
        }

        if let Flow::Stop = flow {
            return Outcome::Halted { index };
        }
    }

    Outcome::Exhausted
}

async fn invoke(
    index: usize,
    handler: &Handler,
    ctx: &mut Context,
    req: &mut Request,
    res: &Response,
) -> Result<Flow, HandlerFailure> {
    match handler {
        Handler::Middleware(middleware) => {
            let (next, receiver) = Next::new();
            let result = guard(index, middleware.handle(req, res, next)).await;
            let signal = receiver.close();
            result?;
            match signal {
                Signal::Advanced => Ok(Flow::Continue),
                Signal::Failed(source) => Err(HandlerFailure::Error { index, source }),
                Signal::Waiting | Signal::Expired => Ok(Flow::Stop),
            }
        }
        Handler::Step(step) => {
            guard(index, step.run(ctx, req, res)).await?;
            Ok(Flow::Continue)
        }
    }
}

/// Normalizes an error return and a panic of a handler into the same failure.
async fn guard<F>(index: usize, fut: F) -> Result<(), HandlerFailure>
where
    F: Future<Output = HandlerResult>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(source)) => Err(HandlerFailure::Error { index, source }),
        Err(payload) => Err(HandlerFailure::Panicked { index, message: panic_message(payload.as_ref()) }),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
