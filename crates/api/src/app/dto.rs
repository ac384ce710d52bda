use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use minerep_core::{DomainError, Entity, JobId};
use minerep_reporting::{JobStatus, ReportCriteria, ReportJob, ReportType};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /reports/jobs`. Fields are optional here so that a missing
/// field is reported as a validation message rather than a decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportRequest {
    pub report_type: Option<String>,
    pub criteria: Option<serde_json::Value>,
}

impl SubmitReportRequest {
    /// Structural validation: required fields present, report type known,
    /// criteria an object with the keys that report needs.
    pub fn validate(self) -> Result<(ReportType, ReportCriteria), DomainError> {
        let report_type = match self.report_type.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.parse::<ReportType>()?,
            _ => return Err(DomainError::validation("reportType is required")),
        };
        let criteria =
            ReportCriteria::from_value(self.criteria.unwrap_or(serde_json::Value::Null))?;
        criteria.validate_for(report_type)?;
        Ok((report_type, criteria))
    }
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<usize>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportResponse {
    pub success: bool,
    pub request_id: JobId,
}

#[derive(Debug, Serialize)]
pub struct SubmitErrorResponse {
    pub success: bool,
    pub message: String,
}

/// `{status}` while PROCESSING, `{status, message}` when FAILED,
/// `{status, artifactName, completedDate}` when COMPLETED.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_date: Option<DateTime<Utc>>,
}

impl From<&ReportJob> for JobStatusResponse {
    fn from(job: &ReportJob) -> Self {
        match job.status() {
            JobStatus::Processing => Self {
                status: JobStatus::Processing,
                message: None,
                artifact_name: None,
                completed_date: None,
            },
            JobStatus::Failed => Self {
                status: JobStatus::Failed,
                message: job.error_message().map(str::to_string),
                artifact_name: None,
                completed_date: None,
            },
            JobStatus::Completed => Self {
                status: JobStatus::Completed,
                message: None,
                artifact_name: job.artifact_name().map(|n| n.to_string()),
                completed_date: job.completed_date(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: JobId,
    pub report_type: ReportType,
    pub status: JobStatus,
    pub requested_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
}

impl From<&ReportJob> for JobSummary {
    fn from(job: &ReportJob) -> Self {
        Self {
            id: *job.id(),
            report_type: job.report_type(),
            status: job.status(),
            requested_date: job.requested_date(),
            completed_date: job.completed_date(),
            message: job.error_message().map(str::to_string),
            artifact_name: job.artifact_name().map(|n| n.to_string()),
        }
    }
}
