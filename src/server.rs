use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::{ApiRequest, ErrorResponse};
use crate::error::ForecastError;
use crate::service::ForecastService;

pub fn router(service: Arc<ForecastService>) -> Router {
    Router::new()
        .route("/api/ml", post(handle_action))
        .route("/health", get(health))
        .with_state(service)
}

pub fn status_for(err: &ForecastError) -> StatusCode {
    match err {
        ForecastError::Busy => StatusCode::CONFLICT,
        ForecastError::UpstreamData(_) => StatusCode::BAD_GATEWAY,
        ForecastError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
        e if e.is_client_error() => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: &ForecastError) -> Response {
    let status = status_for(err);
    if status.is_server_error() {
        tracing::error!(kind = err.kind(), error = %err, "Request failed");
    } else {
        tracing::warn!(kind = err.kind(), error = %err, "Request rejected");
    }
    (status, Json(ErrorResponse::from(err))).into_response()
}

// The body is decoded by hand so malformed JSON gets the same error envelope.
async fn handle_action(State(service): State<Arc<ForecastService>>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ApiRequest::default()
    } else {
        match serde_json::from_slice::<ApiRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return error_response(&ForecastError::InvalidParameter(format!(
                    "malformed request body: {}",
                    e
                )))
            }
        }
    };
    match service.handle(request).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn health(State(service): State<Arc<ForecastService>>) -> Response {
    Json(service.health_check()).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_error_kinds_to_status_codes() {
        assert_eq!(status_for(&ForecastError::Busy), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&ForecastError::UnknownAction("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&ForecastError::NoAnalysisYet), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&ForecastError::UpstreamData("down".to_string())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ForecastError::DeadlineExceeded { budget_secs: 5 }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&ForecastError::ModelFit("singular".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
