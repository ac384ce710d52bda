//! Report execution: catalog of report definitions, data sources, shaping.

pub mod catalog;
pub mod executor;
pub mod postgres;
pub mod shaping;
pub mod source;

use std::time::Duration;

use minerep_reporting::ReportType;

pub use catalog::{ReportCatalog, ReportDefinition, ShapeFn, SourceQuery};
pub use executor::{CatalogExecutor, ReportExecutor};
pub use postgres::PostgresReportSource;
pub use source::{ReportSource, StaticReportSource};

/// Why a report could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    /// The backend could not be reached (pool exhausted, database down).
    #[error("report backend unavailable: {0}")]
    Unavailable(String),

    #[error("query {procedure} failed: {message}")]
    QueryFailed { procedure: String, message: String },

    #[error("incomplete result: expected result-sets {expected:?}, got {received:?}")]
    IncompleteResultSets {
        expected: Vec<String>,
        received: Vec<String>,
    },

    #[error("could not shape {section}: {message}")]
    Shaping { section: String, message: String },

    #[error("no report definition for {0}")]
    UnsupportedReport(ReportType),

    #[error("report did not finish within {0:?}")]
    TimedOut(Duration),
}

impl ExecutionError {
    pub fn query_failed(procedure: impl Into<String>, message: impl ToString) -> Self {
        Self::QueryFailed {
            procedure: procedure.into(),
            message: message.to_string(),
        }
    }

    pub fn shaping(section: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shaping {
            section: section.into(),
            message: message.into(),
        }
    }
}
