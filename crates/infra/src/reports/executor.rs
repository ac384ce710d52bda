//! Report executor: runs a report type's queries and shapes the result.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use minerep_reporting::{ReportBody, ReportCriteria, ReportType};

use super::ExecutionError;
use super::catalog::ReportCatalog;
use super::source::ReportSource;

/// Computes one report.
///
/// All-or-nothing: if any required result-set is missing the whole call fails.
#[async_trait]
pub trait ReportExecutor: Send + Sync {
    async fn execute(
        &self,
        report_type: ReportType,
        criteria: &ReportCriteria,
    ) -> Result<ReportBody, ExecutionError>;
}

/// Executor driven by a [`ReportCatalog`] over any [`ReportSource`].
pub struct CatalogExecutor {
    catalog: ReportCatalog,
    source: Arc<dyn ReportSource>,
}

impl CatalogExecutor {
    pub fn new(catalog: ReportCatalog, source: Arc<dyn ReportSource>) -> Self {
        Self { catalog, source }
    }
}

#[async_trait]
impl ReportExecutor for CatalogExecutor {
    #[instrument(skip(self, criteria), fields(report_type = %report_type), err)]
    async fn execute(
        &self,
        report_type: ReportType,
        criteria: &ReportCriteria,
    ) -> Result<ReportBody, ExecutionError> {
        let definition = self
            .catalog
            .get(report_type)
            .ok_or(ExecutionError::UnsupportedReport(report_type))?;

        let sets = self.source.fetch(&definition.sources, criteria).await?;

        let expected = definition.section_names();
        let received: Vec<String> = sets.iter().map(|s| s.name.clone()).collect();
        if received != expected {
            return Err(ExecutionError::IncompleteResultSets { expected, received });
        }
        debug!(sets = sets.len(), "all result-sets present");

        (definition.shape)(criteria, sets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reports::source::StaticReportSource;
    use serde_json::json;

    fn executor(source: Arc<StaticReportSource>) -> CatalogExecutor {
        CatalogExecutor::new(ReportCatalog::standard(), source)
    }

    fn criteria(v: serde_json::Value) -> ReportCriteria {
        ReportCriteria::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn daily_production_has_both_sections() {
        let exec = executor(Arc::new(StaticReportSource::demo()));
        let body = exec
            .execute(ReportType::DailyProduction, &criteria(json!({"date": "2024-03-01"})))
            .await
            .unwrap();
        assert!(body.section("production").unwrap().as_array().unwrap().len() > 0);
        assert!(body.section("stoppages").is_some());
    }

    #[tokio::test]
    async fn missing_result_set_fails_the_whole_report() {
        let source = Arc::new(StaticReportSource::demo());
        source.drop_result_set("rpt_daily_stoppages");
        let err = executor(source)
            .execute(ReportType::DailyProduction, &criteria(json!({"date": "2024-03-01"})))
            .await
            .unwrap_err();
        match err {
            ExecutionError::IncompleteResultSets { expected, received } => {
                assert_eq!(expected, vec!["production", "stoppages"]);
                assert_eq!(received, vec!["production"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregistered_report_type_is_unsupported() {
        let exec = CatalogExecutor::new(ReportCatalog::new(), Arc::new(StaticReportSource::demo()));
        let err = exec
            .execute(ReportType::EquipmentDowntime, &criteria(json!({"from": "a", "to": "b"})))
            .await
            .unwrap_err();
        assert_eq!(err, ExecutionError::UnsupportedReport(ReportType::EquipmentDowntime));
    }
}
