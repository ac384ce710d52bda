use core::str::FromStr;

use serde::{Deserialize, Serialize};

use minerep_core::DomainError;

/// Which report logic a job runs.
///
/// The wire name (`"DailyProduction"`, ...) is also the value persisted in the
/// job record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportType {
    /// Production against target for one day, plus stoppages.
    DailyProduction,
    /// Production and equipment utilization for one shift.
    ShiftProduction,
    /// Equipment downtime events and per-equipment summary over a date range.
    EquipmentDowntime,
}

impl ReportType {
    pub const ALL: [ReportType; 3] = [
        ReportType::DailyProduction,
        ReportType::ShiftProduction,
        ReportType::EquipmentDowntime,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::DailyProduction => "DailyProduction",
            ReportType::ShiftProduction => "ShiftProduction",
            ReportType::EquipmentDowntime => "EquipmentDowntime",
        }
    }

    /// Criteria keys that must be present at submission.
    pub fn required_criteria(&self) -> &'static [&'static str] {
        match self {
            ReportType::DailyProduction => &["date"],
            ReportType::ShiftProduction => &["date", "shift"],
            ReportType::EquipmentDowntime => &["from", "to"],
        }
    }
}

impl core::fmt::Display for ReportType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown reportType: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_known_name() {
        for t in ReportType::ALL {
            assert_eq!(t.as_str().parse::<ReportType>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_name_is_a_validation_error() {
        let err = "MonthlyTonnage".parse::<ReportType>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!("dailyproduction".parse::<ReportType>().is_err());
    }
}
