use crate::app_state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Records the duration of every request against its route template.
///
/// Unrouted requests share one label so requests for random paths cannot
/// grow the label set.
pub async fn track_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    // ---
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(req).await;

    state
        .metrics()
        .record_http_request(start, &path, &method, response.status().as_u16());
    response
}
