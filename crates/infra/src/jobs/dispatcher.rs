//! Job dispatcher: runs report jobs in the background and records their outcome.
//!
//! Submissions hand a freshly created PROCESSING job to [`DispatcherHandle::dispatch`],
//! which only enqueues it. A supervisor pulls jobs off a bounded channel and runs
//! at most `worker_count` at a time, each inside its own task so that a panic is
//! caught at the task boundary. Whatever happens (executor error, missing
//! result-set, artifact write failure, timeout, panic) ends with exactly one
//! terminal write to the job record store.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, mpsc::error::TrySendError};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

use minerep_core::{Entity, JobId};
use minerep_reporting::{ArtifactName, JobOutcome, JobStatus, ReportJob};

use crate::artifacts::ArtifactStore;
use crate::config::ReportingConfig;
use crate::error::ReportError;
use crate::reports::{ExecutionError, ReportExecutor};

use super::retry::RetryPolicy;
use super::store::{JobRecordStore, JobStoreError};

const QUEUE_FULL_MESSAGE: &str = "report queue is full; please resubmit later";
const SHUTTING_DOWN_MESSAGE: &str = "report service is shutting down";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub max_error_len: usize,
    /// Wall-clock limit per job; `None` lets a job run as long as the backend does.
    pub max_runtime: Option<Duration>,
    /// Backoff for the terminal status write.
    pub resolve_retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&ReportingConfig::default())
    }
}

impl From<&ReportingConfig> for DispatcherConfig {
    fn from(cfg: &ReportingConfig) -> Self {
        Self {
            worker_count: cfg.worker_count.max(1),
            queue_capacity: cfg.queue_capacity.max(1),
            max_error_len: cfg.max_error_len,
            max_runtime: cfg.max_runtime,
            resolve_retry: RetryPolicy::default(),
        }
    }
}

/// Dispatcher runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DispatcherStats {
    /// Accepted onto the queue.
    pub dispatched: u64,
    /// Refused at dispatch (queue full or closed) and failed immediately.
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    /// Subset of `failed` whose task panicked.
    pub panicked: u64,
    /// Outcomes that could not be written even after retries.
    pub unrecorded: u64,
    pub running: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("report queue is full; job {0} was failed")]
    QueueFull(JobId),

    #[error("dispatcher is shut down; job {0} was failed")]
    Closed(JobId),

    #[error("job {0} is not PROCESSING")]
    NotProcessing(JobId),
}

/// Builder for the background dispatcher.
pub struct JobDispatcher {
    store: Arc<dyn JobRecordStore>,
    executor: Arc<dyn ReportExecutor>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl JobDispatcher {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        executor: Arc<dyn ReportExecutor>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            store,
            executor,
            artifacts,
        }
    }

    /// Start the supervisor on the current tokio runtime.
    pub fn spawn(self, config: DispatcherConfig) -> DispatcherHandle {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let worker = Arc::new(Worker {
            store: self.store,
            executor: self.executor,
            artifacts: self.artifacts,
            config,
            stats: Mutex::new(DispatcherStats::default()),
        });
        let supervisor = tokio::spawn(supervise(worker.clone(), rx));

        DispatcherHandle {
            tx,
            worker,
            supervisor,
        }
    }
}

/// Handle to a running dispatcher.
pub struct DispatcherHandle {
    tx: mpsc::Sender<ReportJob>,
    worker: Arc<Worker>,
    supervisor: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Queue a job without waiting for it to run.
    ///
    /// If the queue is saturated or closed the job is resolved FAILED right
    /// away, so it never sits in PROCESSING with nobody to finish it.
    pub async fn dispatch(&self, job: ReportJob) -> Result<(), DispatchError> {
        let id = *job.id();
        if job.status() != JobStatus::Processing {
            return Err(DispatchError::NotProcessing(id));
        }

        let (err, message) = match self.tx.try_send(job) {
            Ok(()) => {
                self.worker.stats.lock().unwrap().dispatched += 1;
                debug!(job_id = %id, "report job queued");
                return Ok(());
            }
            Err(TrySendError::Full(_)) => (DispatchError::QueueFull(id), QUEUE_FULL_MESSAGE),
            Err(TrySendError::Closed(_)) => (DispatchError::Closed(id), SHUTTING_DOWN_MESSAGE),
        };

        warn!(job_id = %id, error = %err, "report job rejected at dispatch");
        self.worker.stats.lock().unwrap().rejected += 1;
        let outcome = JobOutcome::failed(message, self.worker.config.max_error_len, Utc::now());
        self.worker.record(id, outcome).await;
        Err(err)
    }

    pub fn stats(&self) -> DispatcherStats {
        self.worker.stats.lock().unwrap().clone()
    }

    /// Stop accepting jobs and wait for queued and running ones to resolve.
    pub async fn shutdown(self) -> DispatcherStats {
        let DispatcherHandle {
            tx,
            worker,
            supervisor,
        } = self;
        drop(tx);
        if let Err(e) = supervisor.await {
            error!(error = %e, "report dispatcher supervisor ended abnormally");
        }
        let stats = worker.stats.lock().unwrap().clone();
        stats
    }
}

struct Worker {
    store: Arc<dyn JobRecordStore>,
    executor: Arc<dyn ReportExecutor>,
    artifacts: Arc<dyn ArtifactStore>,
    config: DispatcherConfig,
    stats: Mutex<DispatcherStats>,
}

async fn supervise(worker: Arc<Worker>, mut rx: mpsc::Receiver<ReportJob>) {
    let permits = Arc::new(Semaphore::new(worker.config.worker_count.max(1)));
    let mut tasks: JoinSet<()> = JoinSet::new();
    info!(
        workers = worker.config.worker_count,
        queue_capacity = worker.config.queue_capacity,
        max_runtime_secs = worker.config.max_runtime.map(|d| d.as_secs()),
        "report dispatcher started"
    );

    loop {
        tokio::select! {
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "report job supervisor task failed");
                }
            }
            next = rx.recv() => {
                let Some(job) = next else { break };
                let Ok(permit) = permits.clone().acquire_owned().await else { break };
                let worker = worker.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    worker.run(job).await;
                });
            }
        }
    }

    while tasks.join_next().await.is_some() {}
    info!("report dispatcher stopped");
}

impl Worker {
    async fn run(self: Arc<Self>, job: ReportJob) {
        let id = *job.id();
        let span = info_span!("report_job", job_id = %id, report_type = %job.report_type());

        async move {
            self.stats.lock().unwrap().running += 1;
            let started = Instant::now();
            info!("report job started");

            // Run the job in its own task: a panic surfaces here as a JoinError
            // instead of taking the supervisor down with it.
            let computation = tokio::spawn(self.clone().compute(job).in_current_span());
            let outcome = match computation.await {
                Ok(outcome) => outcome,
                Err(e) => self.outcome_for_join_error(e),
            };

            let elapsed_ms = started.elapsed().as_millis() as u64;
            match &outcome {
                JobOutcome::Completed { artifact_name, .. } => {
                    info!(artifact = %artifact_name, elapsed_ms, "report job completed")
                }
                JobOutcome::Failed { message, .. } => {
                    warn!(error = %message, elapsed_ms, "report job failed")
                }
            }

            self.record(id, outcome).await;
            let mut stats = self.stats.lock().unwrap();
            stats.running = stats.running.saturating_sub(1);
        }
        .instrument(span)
        .await
    }

    async fn compute(self: Arc<Self>, job: ReportJob) -> JobOutcome {
        match self.execute_and_publish(&job).await {
            Ok(artifact_name) => JobOutcome::completed(artifact_name, Utc::now()),
            Err(e) => {
                debug!(kind = e.kind(), "report job error");
                JobOutcome::failed(&e.to_string(), self.config.max_error_len, Utc::now())
            }
        }
    }

    /// `max_runtime` bounds the executor call only; a started publish is never
    /// cancelled.
    async fn execute_and_publish(&self, job: &ReportJob) -> Result<ArtifactName, ReportError> {
        let execution = self.executor.execute(job.report_type(), job.criteria());
        let body = match self.config.max_runtime {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .unwrap_or(Err(ExecutionError::TimedOut(limit)))?,
            None => execution.await?,
        };
        let bytes = body
            .to_json_bytes()
            .map_err(|e| ExecutionError::shaping("report", e.to_string()))?;

        let name = ArtifactName::for_job(*job.id());
        self.artifacts.publish(&name, &bytes).await?;
        Ok(name)
    }

    fn outcome_for_join_error(&self, err: JoinError) -> JobOutcome {
        let message = if err.is_panic() {
            self.stats.lock().unwrap().panicked += 1;
            let payload = err.into_panic();
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "no panic message".to_string());
            error!(panic = %detail, "report task panicked");
            format!("report task panicked: {detail}")
        } else {
            error!(error = %err, "report task was cancelled");
            format!("report task was cancelled: {err}")
        };
        JobOutcome::failed(&message, self.config.max_error_len, Utc::now())
    }

    /// Write the terminal state, retrying transient store failures.
    async fn record(&self, id: JobId, outcome: JobOutcome) {
        let status = outcome.status();
        let policy = &self.config.resolve_retry;
        let mut attempt = 0;

        loop {
            match self.store.resolve(id, outcome.clone()).await {
                Ok(_) => {
                    let mut stats = self.stats.lock().unwrap();
                    match status {
                        JobStatus::Completed => stats.completed += 1,
                        _ => stats.failed += 1,
                    }
                    return;
                }
                Err(JobStoreError::AlreadyResolved { status: existing, .. }) => {
                    warn!(
                        job_id = %id,
                        existing = %existing,
                        attempted = %status,
                        "job already resolved"
                    );
                    return;
                }
                Err(e @ (JobStoreError::Unavailable(_) | JobStoreError::Storage(_)))
                    if policy.should_retry(attempt) =>
                {
                    attempt += 1;
                    let delay = policy.delay_for_attempt(attempt);
                    warn!(
                        job_id = %id,
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "could not record job outcome, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    // Left PROCESSING; startup recovery fails it on the next boot.
                    error!(
                        job_id = %id,
                        error = %e,
                        status = %status,
                        "could not record job outcome"
                    );
                    self.stats.lock().unwrap().unrecorded += 1;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::InMemoryArtifactStore;
    use crate::jobs::store::InMemoryJobRecordStore;
    use crate::reports::{CatalogExecutor, ReportCatalog, StaticReportSource};
    use async_trait::async_trait;
    use minerep_reporting::{NewReportJob, ReportBody, ReportCriteria, ReportType};
    use serde_json::json;

    struct Harness {
        store: Arc<InMemoryJobRecordStore>,
        source: Arc<StaticReportSource>,
        artifacts: Arc<InMemoryArtifactStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: Arc::new(InMemoryJobRecordStore::new()),
                source: Arc::new(StaticReportSource::demo()),
                artifacts: Arc::new(InMemoryArtifactStore::new()),
            }
        }

        fn spawn(&self, config: DispatcherConfig) -> DispatcherHandle {
            self.spawn_with(
                Arc::new(CatalogExecutor::new(ReportCatalog::standard(), self.source.clone())),
                config,
            )
        }

        fn spawn_with(
            &self,
            executor: Arc<dyn ReportExecutor>,
            config: DispatcherConfig,
        ) -> DispatcherHandle {
            JobDispatcher::new(self.store.clone(), executor, self.artifacts.clone()).spawn(config)
        }

        async fn submit(&self) -> ReportJob {
            let new = NewReportJob::new(
                ReportType::DailyProduction,
                ReportCriteria::from_value(json!({"date": "2024-03-01"})).unwrap(),
                "alice",
                Utc::now(),
            )
            .unwrap();
            self.store.create(new).await.unwrap()
        }

        async fn wait_terminal(&self, id: JobId) -> ReportJob {
            for _ in 0..500 {
                let job = self.store.get(id).await.unwrap().unwrap();
                if job.status().is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job {id} never left PROCESSING");
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig {
            resolve_retry: RetryPolicy::fixed(2, Duration::from_millis(5)),
            ..DispatcherConfig::default()
        }
    }

    struct PanickingExecutor;

    #[async_trait]
    impl ReportExecutor for PanickingExecutor {
        async fn execute(
            &self,
            _report_type: ReportType,
            _criteria: &ReportCriteria,
        ) -> Result<ReportBody, ExecutionError> {
            panic!("division by zero in shaping");
        }
    }

    #[tokio::test]
    async fn successful_job_is_completed_with_artifact() {
        let h = Harness::new();
        let dispatcher = h.spawn(fast_config());

        let job = h.submit().await;
        let id = *job.id();
        dispatcher.dispatch(job).await.unwrap();

        let done = h.wait_terminal(id).await;
        assert_eq!(done.status(), JobStatus::Completed);
        let name = done.artifact_name().unwrap();
        assert_eq!(name.as_str(), format!("report-{id}.json"));
        assert!(done.completed_date().is_some());

        let bytes = h.artifacts.read(name).await.unwrap().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["production"].is_array());
        assert!(body["stoppages"].is_array());

        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn offline_procedure_fails_the_job() {
        let h = Harness::new();
        h.source.set_offline("rpt_daily_stoppages", true);
        let dispatcher = h.spawn(fast_config());

        let job = h.submit().await;
        let id = *job.id();
        dispatcher.dispatch(job).await.unwrap();

        let done = h.wait_terminal(id).await;
        assert_eq!(done.status(), JobStatus::Failed);
        assert!(done.error_message().unwrap().contains("rpt_daily_stoppages"));
        assert!(done.artifact_name().is_none());
        assert!(h.artifacts.is_empty());
    }

    #[tokio::test]
    async fn artifact_write_failure_fails_the_job() {
        let h = Harness::new();
        h.artifacts.reject_writes(true);
        let dispatcher = h.spawn(fast_config());

        let job = h.submit().await;
        let id = *job.id();
        dispatcher.dispatch(job).await.unwrap();

        let done = h.wait_terminal(id).await;
        assert_eq!(done.status(), JobStatus::Failed);
        assert!(done.error_message().unwrap().starts_with("artifact write failed"));
    }

    #[tokio::test]
    async fn panicking_job_is_failed_and_dispatcher_survives() {
        let h = Harness::new();
        let dispatcher = h.spawn_with(Arc::new(PanickingExecutor), fast_config());

        let first = h.submit().await;
        let second = h.submit().await;
        let (a, b) = (*first.id(), *second.id());
        dispatcher.dispatch(first).await.unwrap();
        dispatcher.dispatch(second).await.unwrap();

        for id in [a, b] {
            let done = h.wait_terminal(id).await;
            assert_eq!(done.status(), JobStatus::Failed);
            assert!(done.error_message().unwrap().contains("division by zero"));
        }
        assert_eq!(dispatcher.shutdown().await.panicked, 2);
    }

    #[tokio::test]
    async fn max_runtime_fails_slow_jobs() {
        let h = Harness::new();
        h.source.set_latency(Duration::from_secs(30));
        let dispatcher = h.spawn(DispatcherConfig {
            max_runtime: Some(Duration::from_millis(50)),
            ..fast_config()
        });

        let job = h.submit().await;
        let id = *job.id();
        dispatcher.dispatch(job).await.unwrap();

        let done = h.wait_terminal(id).await;
        assert_eq!(done.status(), JobStatus::Failed);
        assert!(done.error_message().unwrap().contains("did not finish"));
    }

    #[tokio::test]
    async fn dispatch_does_not_wait_for_computation() {
        let h = Harness::new();
        h.source.set_latency(Duration::from_millis(400));
        let dispatcher = h.spawn(fast_config());

        let job = h.submit().await;
        let id = *job.id();
        let started = Instant::now();
        dispatcher.dispatch(job).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(
            h.store.get(id).await.unwrap().unwrap().status(),
            JobStatus::Processing
        );

        assert_eq!(h.wait_terminal(id).await.status(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn saturated_queue_fails_new_jobs_immediately() {
        let h = Harness::new();
        h.source.set_latency(Duration::from_millis(200));
        let dispatcher = h.spawn(DispatcherConfig {
            worker_count: 1,
            queue_capacity: 1,
            ..fast_config()
        });

        let mut rejected = Vec::new();
        let mut accepted = Vec::new();
        for _ in 0..4 {
            let job = h.submit().await;
            let id = *job.id();
            match dispatcher.dispatch(job).await {
                Ok(()) => accepted.push(id),
                Err(DispatchError::QueueFull(rid)) => {
                    assert_eq!(rid, id);
                    rejected.push(id);
                }
                Err(other) => panic!("unexpected dispatch error: {other}"),
            }
        }
        assert!(!rejected.is_empty());

        for id in &rejected {
            let job = h.store.get(*id).await.unwrap().unwrap();
            assert_eq!(job.status(), JobStatus::Failed);
            assert_eq!(job.error_message(), Some(QUEUE_FULL_MESSAGE));
        }

        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.rejected as usize, rejected.len());
        for id in accepted {
            assert_eq!(h.store.get(id).await.unwrap().unwrap().status(), JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let h = Harness::new();
        h.source.set_latency(Duration::from_millis(20));
        let dispatcher = h.spawn(DispatcherConfig {
            worker_count: 2,
            ..fast_config()
        });

        let mut ids = Vec::new();
        for _ in 0..6 {
            let job = h.submit().await;
            ids.push(*job.id());
            dispatcher.dispatch(job).await.unwrap();
        }

        let stats = dispatcher.shutdown().await;
        assert_eq!(stats.completed, 6);
        assert_eq!(stats.running, 0);
        for id in ids {
            assert_eq!(h.store.get(id).await.unwrap().unwrap().status(), JobStatus::Completed);
        }
    }

    #[tokio::test]
    async fn resolved_jobs_are_not_dispatched() {
        let h = Harness::new();
        let dispatcher = h.spawn(fast_config());
        let job = h.submit().await;
        let id = *job.id();
        let failed = h
            .store
            .resolve(id, JobOutcome::failed("cancelled by test", 100, Utc::now()))
            .await
            .unwrap();
        assert!(matches!(
            dispatcher.dispatch(failed).await,
            Err(DispatchError::NotProcessing(_))
        ));
    }
}
