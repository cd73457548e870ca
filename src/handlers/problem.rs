use crate::domain::PingError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// RFC 7807 body returned for server-side ping failures.
#[derive(Serialize)]
struct ProblemDetails {
    #[serde(rename = "type")]
    kind: &'static str,
    title: &'static str,
    status: u16,
}

impl ProblemDetails {
    fn internal() -> Self {
        Self {
            kind: "https://tools.ietf.org/html/rfc7231#section-6.6.1",
            title: "An error occurred while processing your request.",
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

impl IntoResponse for PingError {
    fn into_response(self) -> Response {
        // ---
        if self.is_client_error() {
            tracing::warn!(reason = self.reason(), "Ping rejected");
            return (StatusCode::BAD_REQUEST, self.to_string()).into_response();
        }

        // Cause stays in the log; clients get the generic body.
        tracing::error!(error = %self, "Ping failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "application/problem+json")],
            Json(ProblemDetails::internal()),
        )
            .into_response()
    }
}
