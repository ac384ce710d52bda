//! Report pipeline error taxonomy.
//!
//! | Kind | Raised by | Effect |
//! |------|-----------|--------|
//! | `Validation` | submission checks | synchronous 400, no job created |
//! | `Execution` | executor / data source | job FAILED |
//! | `Io` | artifact store | job FAILED |
//! | `Infrastructure` | pool, job store, task supervision | job FAILED |

use minerep_core::DomainError;

use crate::artifacts::ArtifactStoreError;
use crate::jobs::JobStoreError;
use crate::reports::ExecutionError;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Execution(ExecutionError),

    #[error("artifact write failed: {0}")]
    Io(#[from] ArtifactStoreError),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl ReportError {
    pub fn kind(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "validation",
            ReportError::Execution(_) => "execution",
            ReportError::Io(_) => "io",
            ReportError::Infrastructure(_) => "infrastructure",
        }
    }
}

impl From<ExecutionError> for ReportError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Unavailable(_) => ReportError::Infrastructure(err.to_string()),
            other => ReportError::Execution(other),
        }
    }
}

impl From<JobStoreError> for ReportError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::Domain(DomainError::Validation(msg)) => ReportError::Validation(msg),
            other => ReportError::Infrastructure(other.to_string()),
        }
    }
}

impl From<DomainError> for ReportError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ReportError::Validation(msg)
            }
            other => ReportError::Infrastructure(other.to_string()),
        }
    }
}
