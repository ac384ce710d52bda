//! Report data sources.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use minerep_reporting::{ReportCriteria, ResultSet, Row};

use super::ExecutionError;
use super::catalog::SourceQuery;

/// Backend that runs the queries of one report invocation.
///
/// Returns one result-set per query, named after `SourceQuery::section`.
/// Implementations hold at most one backend connection per call.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(
        &self,
        queries: &[SourceQuery],
        criteria: &ReportCriteria,
    ) -> Result<Vec<ResultSet>, ExecutionError>;
}

/// In-memory fixtures keyed by procedure name, for development and tests.
///
/// A procedure can be taken offline (its query fails) or dropped (its
/// result-set is silently missing), and every call can be delayed.
#[derive(Debug, Default)]
pub struct StaticReportSource {
    state: RwLock<StaticState>,
}

#[derive(Debug, Default)]
struct StaticState {
    fixtures: HashMap<String, Vec<Row>>,
    offline: HashSet<String>,
    dropped: HashSet<String>,
    latency: Duration,
}

impl StaticReportSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fixture(self, procedure: &str, rows: Vec<Row>) -> Self {
        self.state
            .write()
            .unwrap()
            .fixtures
            .insert(procedure.to_string(), rows);
        self
    }

    pub fn set_offline(&self, procedure: &str, offline: bool) {
        let mut state = self.state.write().unwrap();
        if offline {
            state.offline.insert(procedure.to_string());
        } else {
            state.offline.remove(procedure);
        }
    }

    pub fn drop_result_set(&self, procedure: &str) {
        self.state
            .write()
            .unwrap()
            .dropped
            .insert(procedure.to_string());
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state.write().unwrap().latency = latency;
    }

    /// Small but realistic data for every standard report.
    pub fn demo() -> Self {
        Self::new()
            .with_fixture(
                "rpt_daily_production",
                rows(json!([
                    {"pit_name": "North Pit", "material": "ore", "target_tonnes": 12000, "actual_tonnes": 11340},
                    {"pit_name": "North Pit", "material": "waste", "target_tonnes": 30000, "actual_tonnes": 31250},
                    {"pit_name": "East Pit", "material": "ore", "target_tonnes": 8000, "actual_tonnes": 6120}
                ])),
            )
            .with_fixture(
                "rpt_daily_stoppages",
                rows(json!([
                    {"equipment_code": "EX-104", "reason": "hydraulic hose", "start_time": "06:40", "duration_minutes": 95},
                    {"equipment_code": "HT-221", "reason": "tyre change", "start_time": "13:15", "duration_minutes": 50}
                ])),
            )
            .with_fixture(
                "rpt_shift_production",
                rows(json!([
                    {"loader_code": "EX-104", "material": "ore", "loads": 42, "tonnes": 9450},
                    {"loader_code": "EX-108", "material": "waste", "loads": 61, "tonnes": 13725}
                ])),
            )
            .with_fixture(
                "rpt_shift_equipment",
                rows(json!([
                    {"equipment_code": "HT-221", "operating_minutes": 520, "available_minutes": 660},
                    {"equipment_code": "HT-230", "operating_minutes": 610, "available_minutes": 660}
                ])),
            )
            .with_fixture(
                "rpt_downtime_events",
                rows(json!([
                    {"equipment_code": "DR-12", "category": "mechanical", "started_at": "2024-03-02T04:10:00Z", "duration_minutes": 210},
                    {"equipment_code": "EX-104", "category": "hydraulic", "started_at": "2024-03-04T06:40:00Z", "duration_minutes": 95}
                ])),
            )
            .with_fixture(
                "rpt_downtime_summary",
                rows(json!([
                    {"equipment_code": "DR-12", "event_count": 1, "total_minutes": 210},
                    {"equipment_code": "EX-104", "event_count": 1, "total_minutes": 95}
                ])),
            )
    }
}

fn rows(value: serde_json::Value) -> Vec<Row> {
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl ReportSource for StaticReportSource {
    async fn fetch(
        &self,
        queries: &[SourceQuery],
        _criteria: &ReportCriteria,
    ) -> Result<Vec<ResultSet>, ExecutionError> {
        let latency = self.state.read().unwrap().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let state = self.state.read().unwrap();
        let mut sets = Vec::with_capacity(queries.len());
        for q in queries {
            if state.offline.contains(q.procedure) {
                return Err(ExecutionError::query_failed(q.procedure, "procedure is offline"));
            }
            if state.dropped.contains(q.procedure) {
                continue;
            }
            let rows = state.fixtures.get(q.procedure).cloned().unwrap_or_default();
            sets.push(ResultSet::new(q.section, rows));
        }
        Ok(sets)
    }
}
