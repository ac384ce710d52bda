use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use minerep_core::{DomainError, DomainResult, ValueObject};

use crate::report_type::ReportType;

/// Snapshot of the request parameters taken at submission.
///
/// Always a JSON object. There are no mutators: once a job is created its
/// criteria are fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportCriteria(Map<String, Value>);

impl ValueObject for ReportCriteria {}

impl ReportCriteria {
    /// Accepts only JSON objects.
    pub fn from_value(value: Value) -> DomainResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Err(DomainError::validation("criteria is required")),
            _ => Err(DomainError::validation("criteria must be a JSON object")),
        }
    }

    /// Structural check only: every key the report type needs is present and
    /// not null or blank. Value semantics (date formats, ranges) are left to the
    /// report backend.
    pub fn validate_for(&self, report_type: ReportType) -> DomainResult<()> {
        let missing: Vec<&str> = report_type
            .required_criteria()
            .iter()
            .copied()
            .filter(|key| match self.0.get(*key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DomainError::validation(format!(
                "criteria for {report_type} is missing: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}
