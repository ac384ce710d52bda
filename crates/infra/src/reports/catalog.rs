//! Which result-sets each report type needs, and how they are shaped.

use std::collections::HashMap;

use minerep_reporting::{ReportBody, ReportCriteria, ReportType, ResultSet};

use super::ExecutionError;
use super::shaping;

/// Turns the raw result-sets of one report into the client-facing document.
///
/// Receives the result-sets in the order the definition lists its sources.
pub type ShapeFn = fn(&ReportCriteria, Vec<ResultSet>) -> Result<ReportBody, ExecutionError>;

/// One backend call: the procedure to run and the result-set name it fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceQuery {
    pub section: &'static str,
    pub procedure: &'static str,
}

#[derive(Debug, Clone)]
pub struct ReportDefinition {
    pub report_type: ReportType,
    pub sources: Vec<SourceQuery>,
    pub shape: ShapeFn,
}

impl ReportDefinition {
    pub fn section_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.section.to_string()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReportCatalog {
    definitions: HashMap<ReportType, ReportDefinition>,
}

impl ReportCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, definition: ReportDefinition) -> Self {
        self.definitions.insert(definition.report_type, definition);
        self
    }

    pub fn get(&self, report_type: ReportType) -> Option<&ReportDefinition> {
        self.definitions.get(&report_type)
    }

    /// The mine production reports shipped with the service.
    pub fn standard() -> Self {
        Self::new()
            .register(ReportDefinition {
                report_type: ReportType::DailyProduction,
                sources: vec![
                    SourceQuery {
                        section: "production",
                        procedure: "rpt_daily_production",
                    },
                    SourceQuery {
                        section: "stoppages",
                        procedure: "rpt_daily_stoppages",
                    },
                ],
                shape: shaping::daily_production,
            })
            .register(ReportDefinition {
                report_type: ReportType::ShiftProduction,
                sources: vec![
                    SourceQuery {
                        section: "production",
                        procedure: "rpt_shift_production",
                    },
                    SourceQuery {
                        section: "equipment",
                        procedure: "rpt_shift_equipment",
                    },
                ],
                shape: shaping::shift_production,
            })
            .register(ReportDefinition {
                report_type: ReportType::EquipmentDowntime,
                sources: vec![
                    SourceQuery {
                        section: "events",
                        procedure: "rpt_downtime_events",
                    },
                    SourceQuery {
                        section: "summary",
                        procedure: "rpt_downtime_summary",
                    },
                ],
                shape: shaping::equipment_downtime,
            })
    }
}
