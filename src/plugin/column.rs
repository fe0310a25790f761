//! Column types and value coercion

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::net::IpAddr;

/// Column type as exposed to the query host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Bool,
    Int,
    Double,
    String,
    Json,
    Timestamp,
    Ipaddr,
    Cidr,
}

impl ColumnType {
    /// Convert a raw JSON value into this column's representation.
    /// Values that cannot be represented become `null`.
    pub fn coerce(&self, value: Value) -> Value {
        if value.is_null() {
            return value;
        }

        match self {
            ColumnType::Json => value,
            ColumnType::String => match value {
                Value::String(_) => value,
                Value::Number(n) => Value::String(n.to_string()),
                Value::Bool(b) => Value::String(b.to_string()),
                other => Value::String(other.to_string()),
            },
            ColumnType::Bool => match &value {
                Value::Bool(_) => value,
                Value::String(s) => match s.to_ascii_lowercase().as_str() {
                    "true" | "enabled" | "yes" => Value::Bool(true),
                    "false" | "disabled" | "no" => Value::Bool(false),
                    _ => Value::Null,
                },
                Value::Number(n) => Value::Bool(n.as_i64().map(|n| n != 0).unwrap_or(false)),
                _ => Value::Null,
            },
            ColumnType::Int => match &value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(Value::from)
                    .unwrap_or(Value::Null),
                Value::String(s) => s.trim().parse::<i64>().map(Value::from).unwrap_or(Value::Null),
                _ => Value::Null,
            },
            ColumnType::Double => match &value {
                Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(Value::Null),
                Value::String(s) => s.trim().parse::<f64>().map(Value::from).unwrap_or(Value::Null),
                _ => Value::Null,
            },
            ColumnType::Timestamp => match &value {
                Value::String(s) => parse_timestamp(s)
                    .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
                    .unwrap_or(Value::Null),
                Value::Number(n) => n
                    .as_i64()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                    .map(|t| Value::String(t.to_rfc3339_opts(SecondsFormat::Secs, true)))
                    .unwrap_or(Value::Null),
                _ => Value::Null,
            },
            ColumnType::Ipaddr => match &value {
                Value::String(s) if s.trim().parse::<IpAddr>().is_ok() => value,
                _ => Value::Null,
            },
            ColumnType::Cidr => match &value {
                Value::String(s) if is_cidr(s) => value,
                _ => Value::Null,
            },
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Bool => "bool",
            ColumnType::Int => "int",
            ColumnType::Double => "double",
            ColumnType::String => "string",
            ColumnType::Json => "json",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Ipaddr => "ipaddr",
            ColumnType::Cidr => "cidr",
        };
        f.write_str(name)
    }
}

/// ARM timestamps are RFC 3339, sometimes with 7 fractional digits and no offset
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn is_cidr(s: &str) -> bool {
    let Some((addr, prefix)) = s.trim().split_once('/') else {
        return false;
    };
    let Ok(addr) = addr.parse::<IpAddr>() else {
        return false;
    };
    let max = if addr.is_ipv4() { 32 } else { 128 };
    prefix.parse::<u8>().map(|p| p <= max).unwrap_or(false)
}
