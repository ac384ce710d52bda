//! Report data from Postgres stored procedures.
//!
//! Each catalog procedure is a set-returning function taking the criteria as
//! one `jsonb` argument. Rows come back through `row_to_json`, so column names
//! and types are whatever the procedure declares.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, instrument};

use minerep_reporting::{ReportCriteria, ResultSet, Row};

use super::ExecutionError;
use super::catalog::SourceQuery;
use super::source::ReportSource;

#[derive(Debug, Clone)]
pub struct PostgresReportSource {
    pool: Arc<PgPool>,
}

impl PostgresReportSource {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

#[async_trait]
impl ReportSource for PostgresReportSource {
    #[instrument(skip(self, queries, criteria), fields(query_count = queries.len()), err)]
    async fn fetch(
        &self,
        queries: &[SourceQuery],
        criteria: &ReportCriteria,
    ) -> Result<Vec<ResultSet>, ExecutionError> {
        // One pooled connection for the whole report; returned to the pool when
        // `conn` drops, on success and on every error path.
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ExecutionError::Unavailable(e.to_string()))?;

        let params = criteria.to_value();
        let mut sets = Vec::with_capacity(queries.len());
        for q in queries {
            if !is_plain_identifier(q.procedure) {
                return Err(ExecutionError::query_failed(q.procedure, "not a plain procedure name"));
            }
            let sql = format!("SELECT row_to_json(r) FROM {}($1::jsonb) AS r", q.procedure);
            let values: Vec<serde_json::Value> = sqlx::query_scalar(&sql)
                .bind(&params)
                .fetch_all(&mut *conn)
                .await
                .map_err(|e| ExecutionError::query_failed(q.procedure, e))?;

            let rows = values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::Object(map) => Ok(map),
                    other => Err(ExecutionError::query_failed(
                        q.procedure,
                        format!("expected a row object, got {other}"),
                    )),
                })
                .collect::<Result<Vec<Row>, _>>()?;

            debug!(procedure = q.procedure, rows = rows.len(), "result-set fetched");
            sets.push(ResultSet::new(q.section, rows));
        }
        Ok(sets)
    }
}

/// `[a-z_][a-z0-9_]*`, optionally schema-qualified once.
fn is_plain_identifier(name: &str) -> bool {
    let part = |p: &str| {
        let mut chars = p.chars();
        matches!(chars.next(), Some('a'..='z' | '_'))
            && chars.all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
    };
    match name.split_once('.') {
        Some((schema, proc)) => part(schema) && part(proc),
        None => part(name),
    }
}
