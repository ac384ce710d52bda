//! Report job record and its one-way state machine.

use chrono::{DateTime, Utc};
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use minerep_core::{DomainError, DomainResult, Entity, JobId};

use crate::artifact::ArtifactName;
use crate::criteria::ReportCriteria;
use crate::report_type::ReportType;

/// Default cap on stored error messages, in characters.
pub const DEFAULT_MAX_ERROR_LEN: usize = 1000;

const FALLBACK_ERROR: &str = "report generation failed";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// Terminal result the dispatcher writes back for a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        artifact_name: ArtifactName,
        completed_date: DateTime<Utc>,
    },
    Failed {
        message: String,
        completed_date: DateTime<Utc>,
    },
}

impl JobOutcome {
    pub fn completed(artifact_name: ArtifactName, at: DateTime<Utc>) -> Self {
        Self::Completed {
            artifact_name,
            completed_date: at,
        }
    }

    /// Failure outcome with the message truncated to `max_len` characters.
    pub fn failed(message: &str, max_len: usize, at: DateTime<Utc>) -> Self {
        Self::Failed {
            message: truncate_error_message(message, max_len),
            completed_date: at,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn completed_date(&self) -> DateTime<Utc> {
        match self {
            JobOutcome::Completed { completed_date, .. }
            | JobOutcome::Failed { completed_date, .. } => *completed_date,
        }
    }
}

/// Trim and cap an error message to at most `max_len` characters (minimum 1).
///
/// Cuts on character boundaries. Never returns an empty string: a blank
/// message is replaced by a generic one.
pub fn truncate_error_message(message: &str, max_len: usize) -> String {
    let max_len = max_len.max(1);
    let trimmed = message.trim();
    let source = if trimmed.is_empty() {
        FALLBACK_ERROR
    } else {
        trimmed
    };

    match source.char_indices().nth(max_len) {
        Some((cut, _)) => source[..cut].to_string(),
        None => source.to_string(),
    }
}

/// Everything the submission path knows before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReportJob {
    pub report_type: ReportType,
    pub criteria: ReportCriteria,
    pub requested_by: String,
    pub requested_date: DateTime<Utc>,
}

impl NewReportJob {
    /// Validates the criteria against the report type before anything is stored.
    pub fn new(
        report_type: ReportType,
        criteria: ReportCriteria,
        requested_by: impl Into<String>,
        requested_date: DateTime<Utc>,
    ) -> DomainResult<Self> {
        criteria.validate_for(report_type)?;
        let requested_by = requested_by.into();
        if requested_by.trim().is_empty() {
            return Err(DomainError::validation("requester identity is required"));
        }
        Ok(Self {
            report_type,
            criteria,
            requested_by,
            requested_date,
        })
    }
}

/// Raw column values of a persisted job, as read back from a store.
#[derive(Debug, Clone)]
pub struct ReportJobParts {
    pub id: JobId,
    pub report_type: ReportType,
    pub criteria: ReportCriteria,
    pub status: JobStatus,
    pub requested_by: String,
    pub requested_date: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub artifact_name: Option<ArtifactName>,
}

/// A report job record.
///
/// Created PROCESSING, then resolved exactly once to COMPLETED or FAILED.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportJob {
    id: JobId,
    report_type: ReportType,
    criteria: ReportCriteria,
    status: JobStatus,
    requested_by: String,
    requested_date: DateTime<Utc>,
    completed_date: Option<DateTime<Utc>>,
    error_message: Option<String>,
    artifact_name: Option<ArtifactName>,
}

impl ReportJob {
    pub fn processing(id: JobId, new: NewReportJob) -> Self {
        Self {
            id,
            report_type: new.report_type,
            criteria: new.criteria,
            status: JobStatus::Processing,
            requested_by: new.requested_by,
            requested_date: new.requested_date,
            completed_date: None,
            error_message: None,
            artifact_name: None,
        }
    }

    /// Rebuild a job from stored columns, checking the record invariants.
    pub fn restore(parts: ReportJobParts) -> DomainResult<Self> {
        let consistent = match parts.status {
            JobStatus::Processing => {
                parts.completed_date.is_none()
                    && parts.error_message.is_none()
                    && parts.artifact_name.is_none()
            }
            JobStatus::Completed => {
                parts.completed_date.is_some()
                    && parts.error_message.is_none()
                    && parts.artifact_name.as_ref() == Some(&ArtifactName::for_job(parts.id))
            }
            JobStatus::Failed => {
                parts.completed_date.is_some()
                    && parts.error_message.as_deref().is_some_and(|m| !m.is_empty())
                    && parts.artifact_name.is_none()
            }
        };
        if !consistent {
            return Err(DomainError::invariant(format!(
                "job {} stored in an inconsistent {} state",
                parts.id, parts.status
            )));
        }

        Ok(Self {
            id: parts.id,
            report_type: parts.report_type,
            criteria: parts.criteria,
            status: parts.status,
            requested_by: parts.requested_by,
            requested_date: parts.requested_date,
            completed_date: parts.completed_date,
            error_message: parts.error_message,
            artifact_name: parts.artifact_name,
        })
    }

    /// Resolve the job. Only a PROCESSING job accepts an outcome.
    pub fn apply(&mut self, outcome: JobOutcome) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::illegal_transition(format!(
                "job {} is already {}",
                self.id, self.status
            )));
        }

        match outcome {
            JobOutcome::Completed {
                artifact_name,
                completed_date,
            } => {
                if artifact_name != ArtifactName::for_job(self.id) {
                    return Err(DomainError::invariant(format!(
                        "artifact {artifact_name} does not belong to job {}",
                        self.id
                    )));
                }
                self.status = JobStatus::Completed;
                self.artifact_name = Some(artifact_name);
                self.completed_date = Some(completed_date);
            }
            JobOutcome::Failed {
                message,
                completed_date,
            } => {
                self.status = JobStatus::Failed;
                self.error_message = Some(if message.is_empty() {
                    FALLBACK_ERROR.to_string()
                } else {
                    message
                });
                self.completed_date = Some(completed_date);
            }
        }
        Ok(())
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn criteria(&self) -> &ReportCriteria {
        &self.criteria
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn requested_by(&self) -> &str {
        &self.requested_by
    }

    pub fn requested_date(&self) -> DateTime<Utc> {
        self.requested_date
    }

    pub fn completed_date(&self) -> Option<DateTime<Utc>> {
        self.completed_date
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn artifact_name(&self) -> Option<&ArtifactName> {
        self.artifact_name.as_ref()
    }
}

impl Entity for ReportJob {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
