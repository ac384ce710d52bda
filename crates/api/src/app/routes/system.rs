use std::sync::Arc;

use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};

use minerep_auth::Permission;

use crate::app::errors;
use crate::app::routes::common::CmdAuth;
use crate::app::services::ReportServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// Dispatcher counters. Admin only.
pub async fn dispatcher_stats(
    Extension(services): Extension<Arc<ReportServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let auth = CmdAuth {
        inner: (),
        required: vec![Permission::WILDCARD],
    };
    if let Err(e) = crate::authz::authorize_command(&principal, &auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    (StatusCode::OK, Json(services.dispatcher_stats())).into_response()
}
