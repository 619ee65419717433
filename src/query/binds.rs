//! Bind parameter validation and conversion.
//!
//! Caller-supplied bind values arrive as loosely typed JSON scalars. Before a
//! query touches the database every supplied name is checked against the
//! declared bind schema (unexpected names are hard errors), every required
//! bind must be present, and every value is converted to its declared type.
//! Absent optional binds become SQL NULL so each placeholder has a value.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value as JsonValue;

use crate::catalog::{BindSpec, FieldType};
use crate::db::{BindValue, NamedBind};
use crate::error::{Result, VitalsError};

/// Caller-supplied bind values keyed by parameter name.
pub type BindValues = BTreeMap<String, JsonValue>;

/// Validates `supplied` against `specs` and returns typed binds in
/// declaration order.
pub fn validate_binds(specs: &[BindSpec], supplied: &BindValues) -> Result<Vec<NamedBind>> {
    for name in supplied.keys() {
        if !specs.iter().any(|spec| spec.name == *name) {
            return Err(VitalsError::validation(format!(
                "unexpected bind parameter: {name}"
            )));
        }
    }

    let mut binds = Vec::with_capacity(specs.len());
    for spec in specs {
        let value = match supplied.get(&spec.name) {
            Some(raw) if !raw.is_null() => convert_bind(spec, raw)?,
            _ if spec.optional => BindValue::Null,
            _ => {
                return Err(VitalsError::validation(format!(
                    "missing required bind parameter: {}",
                    spec.name
                )));
            }
        };
        binds.push(NamedBind::new(spec.name.clone(), value));
    }

    Ok(binds)
}

fn convert_bind(spec: &BindSpec, raw: &JsonValue) -> Result<BindValue> {
    let mismatch = |expected: &str| {
        VitalsError::validation(format!(
            "bind parameter '{}': expected {expected}, got {raw}",
            spec.name
        ))
    };

    match spec.bind_type {
        FieldType::String => match raw {
            JsonValue::String(s) => Ok(BindValue::Text(s.clone())),
            JsonValue::Number(n) => Ok(BindValue::Text(n.to_string())),
            JsonValue::Bool(b) => Ok(BindValue::Text(b.to_string())),
            _ => Err(mismatch("a string")),
        },

        FieldType::Int => match raw {
            JsonValue::Number(n) => n.as_i64().map(BindValue::Int).ok_or_else(|| {
                mismatch("an integer")
            }),
            JsonValue::String(s) => s
                .trim()
                .parse::<i64>()
                .map(BindValue::Int)
                .map_err(|_| mismatch("an integer")),
            _ => Err(mismatch("an integer")),
        },

        FieldType::Float => match raw {
            JsonValue::Number(n) => n.as_f64().map(BindValue::Float).ok_or_else(|| {
                mismatch("a number")
            }),
            JsonValue::String(s) => s
                .trim()
                .parse::<f64>()
                .map(BindValue::Float)
                .map_err(|_| mismatch("a number")),
            _ => Err(mismatch("a number")),
        },

        FieldType::Bool => match raw {
            JsonValue::Bool(b) => Ok(BindValue::Bool(*b)),
            JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => Ok(BindValue::Bool(true)),
                "false" | "0" | "no" => Ok(BindValue::Bool(false)),
                _ => Err(mismatch("a boolean")),
            },
            _ => Err(mismatch("a boolean")),
        },

        FieldType::Date => match raw {
            JsonValue::String(s) if is_iso_date(s) => Ok(BindValue::Date(s.clone())),
            _ => Err(mismatch("an ISO date (YYYY-MM-DD)")),
        },

        FieldType::DateTime => match raw {
            JsonValue::String(s) if is_iso_datetime(s) => Ok(BindValue::DateTime(s.clone())),
            _ => Err(mismatch("an ISO datetime")),
        },
    }
}

fn is_iso_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok()
}

fn is_iso_datetime(value: &str) -> bool {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(value).is_ok()
}
