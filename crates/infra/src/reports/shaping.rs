//! Report shaping: camelCase field names, derived percentages and totals.
//!
//! Backend procedures return snake_case columns. Shaping renames every column,
//! adds derived numeric fields, and assembles the named sections of the final
//! document. Missing or null inputs give a null derivation; a non-numeric value
//! in a numeric column is an error.

use serde_json::{Map, Value, json};

use minerep_reporting::{ReportBody, ReportCriteria, ResultSet, Row};

use super::ExecutionError;

pub fn daily_production(
    criteria: &ReportCriteria,
    sets: Vec<ResultSet>,
) -> Result<ReportBody, ExecutionError> {
    let [production, stoppages] = take_sets(sets)?;

    let mut target_total = 0.0;
    let mut actual_total = 0.0;
    let mut rows = Vec::with_capacity(production.rows.len());
    for row in &production.rows {
        let target = number(row, "target_tonnes", &production.name)?;
        let actual = number(row, "actual_tonnes", &production.name)?;
        target_total += target.unwrap_or(0.0);
        actual_total += actual.unwrap_or(0.0);

        let mut shaped = rename_row(row);
        shaped.insert("achievementPct".into(), percent(actual, target));
        rows.push(Value::Object(shaped));
    }

    let lost_minutes = sum(&stoppages, "duration_minutes")?;

    Ok(ReportBody::new()
        .with_section("date", criteria.get("date").cloned().unwrap_or(Value::Null))
        .with_section("production", rows)
        .with_section("stoppages", renamed(&stoppages))
        .with_section(
            "totals",
            json!({
                "targetTonnes": round(target_total, 2),
                "actualTonnes": round(actual_total, 2),
                "achievementPct": percent(Some(actual_total), Some(target_total)),
                "stoppageCount": stoppages.len(),
                "lostHours": round(lost_minutes / 60.0, 2),
            }),
        ))
}

pub fn shift_production(
    criteria: &ReportCriteria,
    sets: Vec<ResultSet>,
) -> Result<ReportBody, ExecutionError> {
    let [production, equipment] = take_sets(sets)?;

    let mut units = Vec::with_capacity(equipment.rows.len());
    for row in &equipment.rows {
        let operating = number(row, "operating_minutes", &equipment.name)?;
        let available = number(row, "available_minutes", &equipment.name)?;
        let mut shaped = rename_row(row);
        shaped.insert("utilizationPct".into(), percent(operating, available));
        units.push(Value::Object(shaped));
    }

    Ok(ReportBody::new()
        .with_section("date", criteria.get("date").cloned().unwrap_or(Value::Null))
        .with_section("shift", criteria.get("shift").cloned().unwrap_or(Value::Null))
        .with_section("production", renamed(&production))
        .with_section("equipment", units)
        .with_section(
            "totals",
            json!({
                "tonnes": round(sum(&production, "tonnes")?, 2),
                "loads": sum(&production, "loads")?,
            }),
        ))
}

pub fn equipment_downtime(
    criteria: &ReportCriteria,
    sets: Vec<ResultSet>,
) -> Result<ReportBody, ExecutionError> {
    let [events, summary] = take_sets(sets)?;

    let with_hours = |set: &ResultSet, minutes_col: &str| -> Result<Vec<Value>, ExecutionError> {
        set.rows
            .iter()
            .map(|row| {
                let minutes = number(row, minutes_col, &set.name)?;
                let mut shaped = rename_row(row);
                shaped.insert(
                    "hours".into(),
                    minutes.map_or(Value::Null, |m| round(m / 60.0, 2).into()),
                );
                Ok(Value::Object(shaped))
            })
            .collect()
    };

    Ok(ReportBody::new()
        .with_section(
            "period",
            json!({
                "from": criteria.get("from").cloned().unwrap_or(Value::Null),
                "to": criteria.get("to").cloned().unwrap_or(Value::Null),
            }),
        )
        .with_section("events", with_hours(&events, "duration_minutes")?)
        .with_section("summary", with_hours(&summary, "total_minutes")?))
}

fn take_sets<const N: usize>(sets: Vec<ResultSet>) -> Result<[ResultSet; N], ExecutionError> {
    let received: Vec<String> = sets.iter().map(|s| s.name.clone()).collect();
    sets.try_into().map_err(|_| ExecutionError::IncompleteResultSets {
        expected: vec![format!("{N} result-sets")],
        received,
    })
}

/// `pit_name` -> `pitName`.
pub fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = !out.is_empty();
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn rename_row(row: &Row) -> Map<String, Value> {
    row.iter().map(|(k, v)| (camel_case(k), v.clone())).collect()
}

fn renamed(set: &ResultSet) -> Vec<Value> {
    set.rows.iter().map(|r| Value::Object(rename_row(r))).collect()
}

fn number(row: &Row, column: &str, section: &str) -> Result<Option<f64>, ExecutionError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        // text columns carrying numbers
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            ExecutionError::shaping(section, format!("column {column} is not numeric: {s:?}"))
        }),
        Some(other) => Err(ExecutionError::shaping(
            section,
            format!("column {column} is not numeric: {other}"),
        )),
    }
}

fn sum(set: &ResultSet, column: &str) -> Result<f64, ExecutionError> {
    set.rows.iter().try_fold(0.0, |acc, row| {
        Ok(acc + number(row, column, &set.name)?.unwrap_or(0.0))
    })
}

fn percent(part: Option<f64>, whole: Option<f64>) -> Value {
    match (part, whole) {
        (Some(p), Some(w)) if w > 0.0 => round(p / w * 100.0, 1).into(),
        _ => Value::Null,
    }
}

fn round(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
