use serde::Serialize;
use serde_json::{Map, Value};

/// One row of a tabular result-set, column name to value.
pub type Row = Map<String, Value>;

/// A named tabular result produced by one backend query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub name: String,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(name: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Shaped, client-facing report document: a JSON object of named sections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ReportBody(Map<String, Value>);

impl ReportBody {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with_section(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

impl Default for ReportBody {
    fn default() -> Self {
        Self::new()
    }
}
