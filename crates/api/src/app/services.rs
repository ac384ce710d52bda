use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};

use minerep_auth::PrincipalId;
use minerep_core::{Entity, JobId};
use minerep_infra::{
    ReportError,
    artifacts::{ArtifactStore, LocalArtifactStore},
    config::{AppConfig, ReportingConfig},
    db,
    jobs::{
        DispatcherConfig, DispatcherHandle, DispatcherStats, InMemoryJobRecordStore,
        JobDispatcher, JobRecordStore, PostgresJobRecordStore, recover_orphaned,
    },
    reports::{
        CatalogExecutor, PostgresReportSource, ReportCatalog, ReportExecutor, ReportSource,
        StaticReportSource,
    },
};
use minerep_reporting::{NewReportJob, ReportCriteria, ReportJob, ReportType};

/// Everything the report routes need, shared behind an `Arc`.
pub struct ReportServices {
    jobs: Arc<dyn JobRecordStore>,
    artifacts: Arc<dyn ArtifactStore>,
    dispatcher: DispatcherHandle,
}

impl ReportServices {
    /// Wire the pipeline and start the dispatcher on the current runtime.
    pub fn new(
        jobs: Arc<dyn JobRecordStore>,
        executor: Arc<dyn ReportExecutor>,
        artifacts: Arc<dyn ArtifactStore>,
        config: &ReportingConfig,
    ) -> Self {
        let dispatcher = JobDispatcher::new(jobs.clone(), executor, artifacts.clone())
            .spawn(DispatcherConfig::from(config));
        Self {
            jobs,
            artifacts,
            dispatcher,
        }
    }

    /// Create the job and hand it to the dispatcher. Returns as soon as the
    /// job record exists; computation happens in the background.
    pub async fn submit(
        &self,
        requested_by: &PrincipalId,
        report_type: ReportType,
        criteria: ReportCriteria,
    ) -> Result<JobId, ReportError> {
        let new = NewReportJob::new(report_type, criteria, requested_by.as_str(), Utc::now())?;
        let job = self.jobs.create(new).await?;
        let id = *job.id();

        // A refused dispatch has already failed the job; the caller still gets
        // the id and sees FAILED on its first status check.
        if let Err(e) = self.dispatcher.dispatch(job).await {
            warn!(job_id = %id, error = %e, "report job could not be queued");
        } else {
            info!(
                job_id = %id,
                report_type = %report_type,
                requested_by = %requested_by,
                "report job submitted"
            );
        }
        Ok(id)
    }

    pub async fn job(&self, id: JobId) -> Result<Option<ReportJob>, ReportError> {
        Ok(self.jobs.get(id).await?)
    }

    pub async fn recent_jobs(
        &self,
        requested_by: Option<&PrincipalId>,
        limit: usize,
    ) -> Result<Vec<ReportJob>, ReportError> {
        Ok(self
            .jobs
            .list_recent(requested_by.map(PrincipalId::as_str), limit)
            .await?)
    }

    /// Body of a COMPLETED job. `None` for any other state, so a body is never
    /// served before the job record says it is complete.
    pub async fn artifact(&self, job: &ReportJob) -> Result<Option<Vec<u8>>, ReportError> {
        match job.artifact_name() {
            Some(name) => Ok(self.artifacts.read(name).await?),
            None => Ok(None),
        }
    }

    pub fn dispatcher_stats(&self) -> DispatcherStats {
        self.dispatcher.stats()
    }

    /// Drain the dispatcher. Call after the HTTP server has stopped.
    pub async fn shutdown(self) -> DispatcherStats {
        self.dispatcher.shutdown().await
    }
}

/// Build services from configuration: Postgres-backed when persistent stores are
/// enabled, in-memory with demo report data otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<ReportServices> {
    let (jobs, source): (Arc<dyn JobRecordStore>, Arc<dyn ReportSource>) =
        match (&config.database, config.server.use_persistent_stores) {
            (Some(db_config), true) => {
                let pool = db::connect_pool(db_config).await?;
                let store = PostgresJobRecordStore::new(pool.clone());
                store
                    .ensure_schema()
                    .await
                    .context("failed to apply report_jobs schema")?;
                info!("using postgres job store and report source");
                (Arc::new(store), Arc::new(PostgresReportSource::new(pool)))
            }
            _ => {
                warn!("USE_PERSISTENT_STORES not enabled; using in-memory jobs and demo data");
                (
                    Arc::new(InMemoryJobRecordStore::new()),
                    Arc::new(StaticReportSource::demo()),
                )
            }
        };

    recover_orphaned(jobs.as_ref())
        .await
        .context("failed to recover orphaned report jobs")?;

    let artifacts = LocalArtifactStore::new(&config.reporting.results_dir);
    artifacts.ensure_root().await?;
    let swept = artifacts.sweep_staging().await?;
    if swept > 0 {
        warn!(files = swept, "removed partial artifacts from an earlier run");
    }

    let executor = Arc::new(CatalogExecutor::new(ReportCatalog::standard(), source));
    Ok(ReportServices::new(
        jobs,
        executor,
        Arc::new(artifacts),
        &config.reporting,
    ))
}
