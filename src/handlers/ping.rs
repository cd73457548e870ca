use crate::app_state::AppState;
use crate::domain::{PingError, PingParams};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

/// Raw query pairs; names are resolved by [`PingParams::from_query`].
type QueryPairs = Vec<(String, String)>;

/// Handler for `GET /ping`.
///
/// Records one heartbeat from a CAD client. Responds `200 OK` with an empty
/// body once the ping is stored; see [`PingError`] for the failure responses.
#[tracing::instrument(skip(state, pairs))]
pub async fn ping_handler(
    State(state): State<AppState>,
    Query(pairs): Query<QueryPairs>,
) -> Result<StatusCode, PingError> {
    // ---
    record_ping(&state, pairs).await
}

/// Router fallback.
///
/// Older clients address the endpoint with other casings or a prefix, so any
/// `GET` whose lower-cased path ends in `ping` is treated as a ping. Every
/// other request is `404 Not Found`.
pub async fn ping_fallback(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    query: Result<Query<QueryPairs>, QueryRejection>,
) -> Response {
    // ---
    if !is_ping_path(uri.path()) {
        return StatusCode::NOT_FOUND.into_response();
    }
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    match query {
        Ok(Query(pairs)) => record_ping(&state, pairs).await.into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

fn is_ping_path(path: &str) -> bool {
    // ---
    path.to_ascii_lowercase().trim_end_matches('/').ends_with("ping")
}

async fn record_ping(state: &AppState, pairs: QueryPairs) -> Result<StatusCode, PingError> {
    // ---
    let result = match PingParams::from_query(pairs) {
        Ok(params) => state.aggregator().record(params).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(outcome) => {
            state.metrics().record_ping(&outcome);
            tracing::info!(
                organisation_id = outcome.organisation_id,
                user_created = outcome.user_created,
                minutes_accrued = outcome.minutes_accrued,
                "Ping recorded"
            );
            Ok(StatusCode::OK)
        }
        Err(err) => {
            if err.is_client_error() {
                state.metrics().record_ping_rejected(err.reason());
            } else {
                state.metrics().record_ping_failed();
            }
            Err(err)
        }
    }
}
