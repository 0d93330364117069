//! The normalize → route → handle → respond pipeline shared by both listeners.

use std::{fmt, sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    response::Response,
    Router,
};
use common::{DispatchError, HandlerResult, HeaderValue};
use http_body_util::BodyExt;
use tracing::{debug, trace, warn};

use super::handler::completion;
use super::normalize::RequestNormalizer;
use super::response;
use super::router::RouteTable;

/// Lifecycle of a single request on a connection. Transitions only move
/// forward; there is no timeout transition unless a handler timeout is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    AccumulatingBody,
    Routing,
    HandlerRunning,
    Responding,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Accepted => "accepted",
            ConnectionState::AccumulatingBody => "accumulating_body",
            ConnectionState::Routing => "routing",
            ConnectionState::HandlerRunning => "handler_running",
            ConnectionState::Responding => "responding",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Shared, cheaply cloneable pipeline state.
#[derive(Clone, Debug)]
pub struct Pipeline {
    routes: Arc<RouteTable>,
    max_body: Option<usize>,
    handler_timeout: Option<Duration>,
}

impl Pipeline {
    /// Create a pipeline over `routes` with no body limit and no handler timeout.
    pub fn new(routes: RouteTable) -> Self {
        Self {
            routes: Arc::new(routes),
            max_body: None,
            handler_timeout: None,
        }
    }

    /// Reject request bodies larger than `limit` bytes with `413`.
    pub fn with_max_body(mut self, limit: Option<usize>) -> Self {
        self.max_body = limit;
        self
    }

    /// Answer `504` when a handler has not completed within `timeout`.
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// The route table requests are resolved against.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Run one request through the pipeline.
    pub async fn dispatch(&self, request: Request) -> Response {
        let (parts, mut body) = request.into_parts();
        let target = parts.uri.to_string();
        let mut normalizer = RequestNormalizer::new(parts.method.as_str(), &target, &parts.headers)
            .with_max_body(self.max_body);

        trace!(state = %ConnectionState::AccumulatingBody, target = %target);
        while let Some(frame) = body.frame().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    let err = DispatchError::BodyRead(e.to_string());
                    debug!(error = %err, "abandoning request");
                    return response::respond_error(&err);
                }
            };
            if let Some(chunk) = frame.data_ref() {
                if let Err(err) = normalizer.push_chunk(chunk) {
                    warn!(error = %err, received = normalizer.received(), "rejecting request body");
                    return response::respond_error(&err);
                }
            }
        }
        let request = Arc::new(normalizer.finish());

        trace!(state = %ConnectionState::Routing, path = %request.path);
        let handler = self.routes.resolve(&request.path);
        debug!(
            method = %request.method,
            path = %request.path,
            matched = self.routes.contains(&request.path),
            user_agent = request.header("user-agent").map(HeaderValue::first),
            "dispatching request"
        );

        trace!(state = %ConnectionState::HandlerRunning);
        let (complete, pending) = completion();
        handler.receive(Arc::clone(&request), complete);

        let completed = match self.handler_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, pending.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let err = DispatchError::HandlerTimeout {
                        path: request.path.clone(),
                        timeout_secs: timeout.as_secs(),
                    };
                    warn!(error = %err, "handler timed out");
                    return response::respond_error(&err);
                }
            },
            None => pending.wait().await,
        };

        let result: HandlerResult = match completed {
            Some(result) => result,
            None => {
                let err = DispatchError::HandlerDropped {
                    path: request.path.clone(),
                };
                warn!(error = %err, "handler did not complete");
                return response::respond_error(&err);
            }
        };

        trace!(state = %ConnectionState::Responding);
        response::respond(result)
    }
}

/// Wrap the pipeline in an axum [`Router`] whose fallback dispatches every
/// request, whatever its method or path.
///
/// axum does no routing here; paths are resolved by the pipeline's
/// [`RouteTable`].
pub fn app(pipeline: Pipeline) -> Router {
    Router::new().fallback(dispatch).with_state(pipeline)
}

async fn dispatch(State(pipeline): State<Pipeline>, request: Request) -> Response {
    pipeline.dispatch(request).await
}
