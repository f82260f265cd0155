//! Column type model, inference, and value coercion.
//!
//! [`infer_type()`] narrows a fixed candidate set over every non-empty value of
//! a column and picks the first survivor in priority order
//! (`boolean`, `integer`, `date`, `number`, `string`). Because candidates are
//! only ever removed, the result depends on which values appear, never on
//! their order.
//!
//! [`coerce_values()`] then converts raw values into the representation the
//! chosen type implies. Date values are kept exactly as ingested; the renderer
//! parses them itself.

use std::fmt;

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Boolean,
    Integer,
    Number,
    Date,
    #[default]
    Auto,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Number => "number",
            DataType::Date => "date",
            DataType::Auto => "auto",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "boolean", "integer", "number", "date", "auto"]
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Number)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DataType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "str" => Ok(DataType::String),
            "boolean" | "bool" => Ok(DataType::Boolean),
            "integer" | "int" => Ok(DataType::Integer),
            "number" | "float" | "double" => Ok(DataType::Number),
            "date" | "datetime" => Ok(DataType::Date),
            "auto" => Ok(DataType::Auto),
            _ => Err(anyhow!(
                "Unknown data type '{value}'. Supported types: {}",
                DataType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    scanned: bool,
    possible_boolean: bool,
    possible_integer: bool,
    possible_date: bool,
    possible_number: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            scanned: false,
            possible_boolean: true,
            possible_integer: true,
            possible_date: true,
            possible_number: true,
        }
    }

    fn observe(&mut self, value: &Value) {
        self.scanned = true;
        if self.possible_boolean && !is_boolean(value) {
            self.possible_boolean = false;
        }
        if self.possible_integer && !is_integer(value) {
            self.possible_integer = false;
        }
        if self.possible_date && !is_date(value) {
            self.possible_date = false;
        }
        if self.possible_number && as_number(value).is_none() {
            self.possible_number = false;
        }
    }

    fn decide(&self) -> DataType {
        if !self.scanned {
            DataType::String
        } else if self.possible_boolean {
            DataType::Boolean
        } else if self.possible_integer {
            DataType::Integer
        } else if self.possible_date {
            DataType::Date
        } else if self.possible_number {
            DataType::Number
        } else {
            DataType::String
        }
    }
}

/// Returns true for values that inference skips: null and blank text.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

pub fn infer_type<'a, I>(values: I) -> DataType
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut candidate = TypeCandidate::new();
    for value in values.into_iter().filter(|v| !is_missing(v)) {
        candidate.observe(value);
    }
    candidate.decide()
}

/// Resolves `Auto` by inference over `values`; any other type is returned as is.
pub fn resolve_type<'a, I>(declared: DataType, values: I) -> DataType
where
    I: IntoIterator<Item = &'a Value>,
{
    match declared {
        DataType::Auto => infer_type(values),
        other => other,
    }
}

fn is_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => parse_boolean(s).is_some(),
        _ => false,
    }
}

fn parse_boolean(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        Some(true)
    } else if trimmed.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn is_integer(value: &Value) -> bool {
    as_number(value).is_some_and(|n| n.fract() == 0.0)
}

/// Numeric view of a value: JSON numbers, or strings that parse to a finite
/// float and are not date strings.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || looks_like_date(trimmed) {
                return None;
            }
            trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

fn is_date(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<f64>().is_err() && looks_like_date(trimmed)
        }
        _ => false,
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn looks_like_date(value: &str) -> bool {
    parse_naive_date(value).is_some() || parse_naive_datetime(value).is_some()
}

/// Converts `value` to the representation of `ty`.
///
/// Null and `""` always become null. Other blank text survives in String
/// columns and becomes null for every other type.
pub fn coerce_value(value: &Value, ty: DataType) -> Value {
    match value {
        Value::Null => return Value::Null,
        Value::String(s) if s.is_empty() => return Value::Null,
        Value::String(s) if ty != DataType::String && s.trim().is_empty() => {
            return Value::Null;
        }
        _ => {}
    }
    match ty {
        DataType::Boolean => match value {
            Value::Bool(b) => Value::Bool(*b),
            Value::String(s) => parse_boolean(s).map(Value::Bool).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        DataType::Integer => match as_number(value) {
            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Value::Number(Number::from(f as i64))
            }
            Some(f) => float_value(f),
            None => Value::Null,
        },
        DataType::Number => match value {
            Value::Number(n) => Value::Number(n.clone()),
            other => as_number(other).map(float_value).unwrap_or(Value::Null),
        },
        DataType::String => match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        },
        // Dates stay in their ingested form.
        DataType::Date | DataType::Auto => value.clone(),
    }
}

pub fn coerce_values(values: &[Value], ty: DataType) -> Vec<Value> {
    values.iter().map(|v| coerce_value(v, ty)).collect()
}

fn float_value(f: f64) -> Value {
    Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null)
}

/// Text form of a cell used for delimited export and distinct-value keys.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
