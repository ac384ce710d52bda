//! Job record storage.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use minerep_core::{DomainError, JobId};
use minerep_reporting::{JobOutcome, JobStatus, NewReportJob, ReportJob};

/// Single source of truth for report job state.
///
/// `resolve` is the only mutation after `create`, and it succeeds at most
/// once per job: resolving a job that is no longer PROCESSING returns
/// [`JobStoreError::AlreadyResolved`] and changes nothing.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    /// Persist a new PROCESSING job and assign its id.
    async fn create(&self, new: NewReportJob) -> Result<ReportJob, JobStoreError>;

    async fn get(&self, id: JobId) -> Result<Option<ReportJob>, JobStoreError>;

    /// Move a PROCESSING job to its terminal state.
    async fn resolve(&self, id: JobId, outcome: JobOutcome) -> Result<ReportJob, JobStoreError>;

    /// Newest first. `requested_by = None` lists every requester.
    async fn list_recent(
        &self,
        requested_by: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReportJob>, JobStoreError>;

    /// Fail every job still PROCESSING. Used at startup, before the dispatcher
    /// runs, for jobs whose worker died with the previous process.
    async fn fail_orphaned(&self, message: &str, at: DateTime<Utc>) -> Result<u64, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {id} is already {status}")]
    AlreadyResolved { id: JobId, status: JobStatus },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobRecordStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    jobs: BTreeMap<JobId, ReportJob>,
}

impl InMemoryJobRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRecordStore for InMemoryJobRecordStore {
    async fn create(&self, new: NewReportJob) -> Result<ReportJob, JobStoreError> {
        let mut inner = self.inner.write().unwrap();
        inner.last_id += 1;
        let id = JobId::new(inner.last_id)?;
        let job = ReportJob::processing(id, new);
        inner.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<ReportJob>, JobStoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner.jobs.get(&id).cloned())
    }

    async fn resolve(&self, id: JobId, outcome: JobOutcome) -> Result<ReportJob, JobStoreError> {
        let mut inner = self.inner.write().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(JobStoreError::NotFound(id))?;
        if job.status().is_terminal() {
            return Err(JobStoreError::AlreadyResolved {
                id,
                status: job.status(),
            });
        }
        job.apply(outcome)?;
        Ok(job.clone())
    }

    async fn list_recent(
        &self,
        requested_by: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReportJob>, JobStoreError> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .jobs
            .values()
            .rev()
            .filter(|j| requested_by.is_none_or(|who| j.requested_by() == who))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fail_orphaned(&self, message: &str, at: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let mut inner = self.inner.write().unwrap();
        let mut failed = 0;
        for job in inner.jobs.values_mut() {
            if job.status() == JobStatus::Processing {
                job.apply(JobOutcome::failed(message, usize::MAX, at))?;
                failed += 1;
            }
        }
        Ok(failed)
    }
}
