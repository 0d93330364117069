//! The contract between the pipeline and route handlers.
//!
//! A handler receives the normalized request together with a [`Completion`]
//! handle and reports its result by consuming that handle, either before
//! `receive` returns or later from a task it spawned. The pipeline awaits the
//! paired [`PendingCompletion`].

use std::sync::Arc;

use common::{HandlerResult, NormalizedRequest};
use serde_json::Value;
use tokio::sync::oneshot;

/// A route handler.
///
/// Any `Fn(Arc<NormalizedRequest>, Completion) + Send + Sync` closure or
/// function is a handler.
#[cfg_attr(test, mockall::automock)]
pub trait Handler: Send + Sync {
    /// Handle `request` and eventually call [`Completion::complete`].
    ///
    /// A handler that holds on to `complete` and never uses it leaves the
    /// request waiting until the pipeline's handler timeout, if any, fires.
    fn receive(&self, request: Arc<NormalizedRequest>, complete: Completion);
}

impl<F> Handler for F
where
    F: Fn(Arc<NormalizedRequest>, Completion) + Send + Sync,
{
    fn receive(&self, request: Arc<NormalizedRequest>, complete: Completion) {
        self(request, complete)
    }
}

/// Create a linked completion handle and the future that observes it.
pub fn completion() -> (Completion, PendingCompletion) {
    let (tx, rx) = oneshot::channel();
    (Completion { tx }, PendingCompletion { rx })
}

/// One-shot handle a handler uses to deliver its result.
///
/// Completing consumes the handle, so a result can be delivered at most once.
#[derive(Debug)]
pub struct Completion {
    tx: oneshot::Sender<HandlerResult>,
}

impl Completion {
    /// Deliver the handler's result to the response writer.
    pub fn complete(self, result: HandlerResult) {
        // The receiver is gone only when the connection was torn down first.
        if self.tx.send(result).is_err() {
            tracing::debug!("handler completed after the request was abandoned");
        }
    }

    /// Shorthand for completing with a raw status code and payload.
    pub fn respond(self, status_code: impl Into<Value>, payload: impl Into<Value>) {
        self.complete(HandlerResult::new(status_code, payload));
    }
}

/// The pipeline's side of a [`Completion`].
#[derive(Debug)]
pub struct PendingCompletion {
    rx: oneshot::Receiver<HandlerResult>,
}

impl PendingCompletion {
    /// Wait for the handler's result.
    ///
    /// Resolves to `None` if the handler dropped its [`Completion`] without
    /// completing.
    pub async fn wait(self) -> Option<HandlerResult> {
        self.rx.await.ok()
    }
}
