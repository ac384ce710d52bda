//! Postgres-backed job record store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError |
//! |------------|----------------------|---------------|
//! | Database (check constraint violation) | `23514` | `Storage` (schema rejected the record) |
//! | Database (other) | Any other | `Storage` |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Unavailable` |
//! | Other | N/A | `Storage` |
//!
//! The schema's CHECK constraints mirror the record invariants (artifact name
//! iff COMPLETED, error message iff FAILED, completion date iff terminal), so a
//! bug elsewhere cannot persist an inconsistent row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::{info, instrument};

use minerep_core::{DomainError, JobId};
use minerep_reporting::{
    ArtifactName, JobOutcome, JobStatus, NewReportJob, ReportCriteria, ReportJob, ReportJobParts,
};

use super::store::{JobRecordStore, JobStoreError};

const SCHEMA: &str = include_str!("../../migrations/001_report_jobs.sql");

const COLUMNS: &str = "id, report_type, criteria, status, requested_by, requested_date, \
                       completed_date, error_message, artifact_name";

#[derive(Debug, Clone)]
pub struct PostgresJobRecordStore {
    pool: Arc<PgPool>,
}

impl PostgresJobRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the bundled schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        info!("report_jobs schema ready");
        Ok(())
    }

    async fn fetch_one(&self, id: JobId) -> Result<Option<ReportJob>, JobStoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM report_jobs WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        row.map(|r| decode_job(&r)).transpose()
    }
}

#[async_trait]
impl JobRecordStore for PostgresJobRecordStore {
    #[instrument(
        skip(self, new),
        fields(report_type = %new.report_type, requested_by = %new.requested_by),
        err
    )]
    async fn create(&self, new: NewReportJob) -> Result<ReportJob, JobStoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO report_jobs (report_type, criteria, status, requested_by, requested_date)
            VALUES ($1, $2, 'PROCESSING', $3, $4)
            RETURNING id
            "#,
        )
        .bind(new.report_type.as_str())
        .bind(new.criteria.to_value())
        .bind(&new.requested_by)
        .bind(new.requested_date)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("create", e))?;
        Ok(ReportJob::processing(JobId::new(id)?, new))
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn get(&self, id: JobId) -> Result<Option<ReportJob>, JobStoreError> {
        self.fetch_one(id).await
    }

    #[instrument(skip(self, outcome), fields(job_id = %id, status = %outcome.status()), err)]
    async fn resolve(&self, id: JobId, outcome: JobOutcome) -> Result<ReportJob, JobStoreError> {
        let (status, completed_date, error_message, artifact_name) = match &outcome {
            JobOutcome::Completed {
                artifact_name,
                completed_date,
            } => {
                if artifact_name.job_id() != id {
                    return Err(DomainError::invariant(format!(
                        "artifact {artifact_name} does not belong to job {id}"
                    ))
                    .into());
                }
                (JobStatus::Completed, *completed_date, None, Some(artifact_name.as_str()))
            }
            JobOutcome::Failed {
                message,
                completed_date,
            } => (JobStatus::Failed, *completed_date, Some(message.as_str()), None),
        };

        // The status guard makes the transition one-way even with concurrent writers.
        let row = sqlx::query(&format!(
            r#"
            UPDATE report_jobs
            SET status = $2, completed_date = $3, error_message = $4, artifact_name = $5
            WHERE id = $1 AND status = 'PROCESSING'
            RETURNING {COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(status.as_str())
        .bind(completed_date)
        .bind(error_message)
        .bind(artifact_name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("resolve", e))?;

        match row {
            Some(row) => decode_job(&row),
            None => match self.fetch_one(id).await? {
                Some(existing) => Err(JobStoreError::AlreadyResolved {
                    id,
                    status: existing.status(),
                }),
                None => Err(JobStoreError::NotFound(id)),
            },
        }
    }

    #[instrument(skip(self), err)]
    async fn list_recent(
        &self,
        requested_by: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ReportJob>, JobStoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {COLUMNS}
            FROM report_jobs
            WHERE ($1::text IS NULL OR requested_by = $1)
            ORDER BY id DESC
            LIMIT $2
            "#
        ))
        .bind(requested_by)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_recent", e))?;

        rows.iter().map(decode_job).collect()
    }

    #[instrument(skip(self), err)]
    async fn fail_orphaned(&self, message: &str, at: DateTime<Utc>) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            r#"
            UPDATE report_jobs
            SET status = 'FAILED', completed_date = $2, error_message = $1
            WHERE status = 'PROCESSING'
            "#,
        )
        .bind(message)
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fail_orphaned", e))?;

        Ok(result.rows_affected())
    }
}

/// Raw `report_jobs` row.
struct ReportJobRow {
    id: i64,
    report_type: String,
    criteria: serde_json::Value,
    status: String,
    requested_by: String,
    requested_date: DateTime<Utc>,
    completed_date: Option<DateTime<Utc>>,
    error_message: Option<String>,
    artifact_name: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for ReportJobRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(ReportJobRow {
            id: row.try_get("id")?,
            report_type: row.try_get("report_type")?,
            criteria: row.try_get("criteria")?,
            status: row.try_get("status")?,
            requested_by: row.try_get("requested_by")?,
            requested_date: row.try_get("requested_date")?,
            completed_date: row.try_get("completed_date")?,
            error_message: row.try_get("error_message")?,
            artifact_name: row.try_get("artifact_name")?,
        })
    }
}

impl TryFrom<ReportJobRow> for ReportJob {
    type Error = DomainError;

    fn try_from(row: ReportJobRow) -> Result<Self, Self::Error> {
        ReportJob::restore(ReportJobParts {
            id: JobId::new(row.id)?,
            report_type: row.report_type.parse()?,
            criteria: ReportCriteria::from_value(row.criteria)?,
            status: row.status.parse()?,
            requested_by: row.requested_by,
            requested_date: row.requested_date,
            completed_date: row.completed_date,
            error_message: row.error_message,
            artifact_name: row.artifact_name.map(ArtifactName::try_from).transpose()?,
        })
    }
}

fn decode_job(row: &sqlx::postgres::PgRow) -> Result<ReportJob, JobStoreError> {
    let raw = ReportJobRow::from_row(row).map_err(|e| map_sqlx_error("decode", e))?;
    Ok(ReportJob::try_from(raw)?)
}

/// Map SQLx errors to JobStoreError with operation context.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => JobStoreError::Storage(format!("{msg} (check constraint)")),
                _ => JobStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            JobStoreError::Unavailable(format!("{operation}: {err}"))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
