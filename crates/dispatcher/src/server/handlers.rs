//! Bundled route handlers.

use std::sync::Arc;

use common::{protocol::SampleResponse, HandlerResult, NormalizedRequest};
use serde_json::Value;

use super::handler::Completion;
use super::router::RouteTable;

/// `ping`: liveness check. Always `200 {}`.
pub fn ping(_request: Arc<NormalizedRequest>, complete: Completion) {
    complete.complete(HandlerResult::status(200));
}

/// `sample`: fixed `406 {"name":"sample handler"}`.
pub fn sample(_request: Arc<NormalizedRequest>, complete: Completion) {
    let body = SampleResponse {
        name: "sample handler".into(),
    };
    complete.complete(HandlerResult::json(406, &body));
}

/// Fallback for unregistered paths: `404 {}`.
pub fn not_found(_request: Arc<NormalizedRequest>, complete: Completion) {
    complete.respond(404, Value::Null);
}

/// Route table served by the binary.
pub fn default_routes() -> RouteTable {
    RouteTable::builder()
        .route("ping", ping)
        .route("sample", sample)
        .not_found(not_found)
        .build()
}
