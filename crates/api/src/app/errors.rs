use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use minerep_infra::ReportError;

use crate::app::dto::SubmitErrorResponse;

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Submission failures keep the `{success: false, message}` shape clients
/// already check for.
pub fn submit_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(SubmitErrorResponse {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn report_error_to_response(err: ReportError) -> axum::response::Response {
    match err {
        ReportError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ReportError::Infrastructure(msg) => {
            error!(error = %msg, "report backend unavailable");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "unavailable", "report service unavailable")
        }
        other => {
            error!(error = %other, kind = other.kind(), "report request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}
