use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use tracing::{debug, error};

use minerep_auth::Permission;
use minerep_core::{Entity, JobId};
use minerep_infra::ReportError;
use minerep_reporting::{ArtifactName, JobStatus, ReportJob};

use crate::app::{dto, errors};
use crate::app::routes::common::CmdAuth;
use crate::app::routes::system;
use crate::app::services::ReportServices;
use crate::context::PrincipalContext;

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

pub fn router() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs).post(submit_report))
        .route("/jobs/:id", get(job_status))
        .route("/jobs/:id/result", get(job_result))
        .route("/artifacts/:name", get(artifact_by_name))
        .route("/dispatcher", get(system::dispatcher_stats))
}

fn require(
    principal: &PrincipalContext,
    permission: Permission,
) -> Result<(), axum::response::Response> {
    let auth = CmdAuth {
        inner: (),
        required: vec![permission],
    };
    crate::authz::authorize_command(principal, &auth)
        .map_err(|e| errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string()))
}

pub async fn submit_report(
    Extension(services): Extension<Arc<ReportServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::SubmitReportRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rejection) => {
            return errors::submit_error(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    let cmd = CmdAuth {
        inner: body,
        required: vec![Permission::REPORTS_SUBMIT],
    };
    if let Err(e) = crate::authz::authorize_command(&principal, &cmd) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let (report_type, criteria) = match cmd.inner.validate() {
        Ok(v) => v,
        Err(e) => return errors::submit_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match services
        .submit(principal.principal_id(), report_type, criteria)
        .await
    {
        Ok(request_id) => (
            StatusCode::OK,
            Json(dto::SubmitReportResponse {
                success: true,
                request_id,
            }),
        )
            .into_response(),
        Err(ReportError::Validation(msg)) => errors::submit_error(StatusCode::BAD_REQUEST, msg),
        Err(e) => errors::report_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<ReportServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, Permission::REPORTS_READ) {
        return resp;
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
    match services
        .recent_jobs(Some(principal.principal_id()), limit)
        .await
    {
        Ok(jobs) => {
            let items: Vec<dto::JobSummary> = jobs.iter().map(dto::JobSummary::from).collect();
            (StatusCode::OK, Json(items)).into_response()
        }
        Err(e) => errors::report_error_to_response(e),
    }
}

pub async fn job_status(
    Extension(services): Extension<Arc<ReportServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job = match visible_job_by_id(&services, &principal, &id).await {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    (StatusCode::OK, Json(dto::JobStatusResponse::from(&job))).into_response()
}

pub async fn job_result(
    Extension(services): Extension<Arc<ReportServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job = match visible_job_by_id(&services, &principal, &id).await {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    serve_artifact(&services, &job).await
}

pub async fn artifact_by_name(
    Extension(services): Extension<Arc<ReportServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(name): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = require(&principal, Permission::REPORTS_READ) {
        return resp;
    }

    let requested = match ArtifactName::parse_requested(&name) {
        Ok(n) => n,
        Err(e) => {
            debug!(requested = %name, error = %e, "artifact name rejected");
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_artifact_name",
                "invalid artifact name",
            );
        }
    };

    let job = match visible_job(&services, &principal, requested.job_id()).await {
        Ok(job) => job,
        Err(resp) => return resp,
    };
    if job.status() == JobStatus::Completed && job.artifact_name() != Some(&requested) {
        return not_found();
    }
    serve_artifact(&services, &job).await
}

async fn visible_job_by_id(
    services: &ReportServices,
    principal: &PrincipalContext,
    raw_id: &str,
) -> Result<ReportJob, axum::response::Response> {
    require(principal, Permission::REPORTS_READ)?;
    let id: JobId = raw_id
        .parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"))?;
    visible_job(services, principal, id).await
}

/// Jobs owned by someone else are reported as missing unless the caller holds `*`.
async fn visible_job(
    services: &ReportServices,
    principal: &PrincipalContext,
    id: JobId,
) -> Result<ReportJob, axum::response::Response> {
    match services.job(id).await {
        Ok(Some(job)) if crate::authz::can_view_job(principal, &job) => Ok(job),
        Ok(_) => Err(not_found()),
        Err(e) => Err(errors::report_error_to_response(e)),
    }
}

async fn serve_artifact(services: &ReportServices, job: &ReportJob) -> axum::response::Response {
    if job.status() != JobStatus::Completed {
        return (StatusCode::NOT_FOUND, Json(dto::JobStatusResponse::from(job))).into_response();
    }

    match services.artifact(job).await {
        Ok(Some(bytes)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json"),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes,
        )
            .into_response(),
        Ok(None) => {
            error!(job_id = %job.id(), "completed job has no artifact");
            errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "artifact_missing",
                "report artifact is missing",
            )
        }
        Err(e) => errors::report_error_to_response(e),
    }
}

fn not_found() -> axum::response::Response {
    errors::json_error(StatusCode::NOT_FOUND, "not_found", "report job not found")
}
