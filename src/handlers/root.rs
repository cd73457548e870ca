use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct RootResponse {
    message: &'static str,
}

/// Liveness banner kept for clients that check `/` before pinging.
pub async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Service works.",
    })
}
