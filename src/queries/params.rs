//! Raw query-string access and scalar parsing
//!
//! Every accessor returns a [`ValidationDetail`] on failure so a query model
//! can report all bad fields in one 422 response.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::models::ValidationDetail;

/// Named SQL parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Int(i64),
    IntList(Vec<i32>),
    Float(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

/// Named parameters keyed by placeholder name
pub type SqlParams = BTreeMap<String, SqlValue>;

/// Decoded query-string pairs, keyed by snake_case name
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    values: BTreeMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded `(key, value)` pairs. camelCase keys are accepted
    /// and stored decamelized.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in pairs {
            values
                .entry(decamelize(k.as_ref()))
                .or_default()
                .push(v.into());
        }
        Self { values }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Last value for `key`, whitespace stripped
    pub fn get(&self, key: &str) -> Result<Option<&str>, ValidationDetail> {
        match self.values.get(key).and_then(|v| v.last()) {
            None => Ok(None),
            Some(raw) => {
                let value = raw.trim();
                if value.is_empty() {
                    Err(ValidationDetail::query(
                        key,
                        "String should have at least 1 character",
                        "string_too_short",
                    ))
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.values
            .get(key)
            .map(|v| v.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn string(&self, key: &str) -> Result<Option<String>, ValidationDetail> {
        Ok(self.get(key)?.map(|s| s.to_string()))
    }

    pub fn int(&self, key: &str) -> Result<Option<i64>, ValidationDetail> {
        match self.get(key)? {
            None => Ok(None),
            Some(v) => v.parse::<i64>().map(Some).map_err(|_| {
                ValidationDetail::query(
                    key,
                    "Input should be a valid integer, unable to parse string as an integer",
                    "int_parsing",
                )
            }),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>, ValidationDetail> {
        match self.get(key)? {
            None => Ok(None),
            Some(v) => parse_bool(v).map(Some).ok_or_else(|| {
                ValidationDetail::query(
                    key,
                    "Input should be a valid boolean, unable to interpret input",
                    "bool_parsing",
                )
            }),
        }
    }

    /// Comma separated integer list; repeated keys are flattened
    pub fn int_list(&self, key: &str) -> Result<Option<Vec<i32>>, ValidationDetail> {
        let raw = self.get_all(key);
        if raw.is_empty() {
            return Ok(None);
        }
        CommaSeparatedList::<i32>::parse(&raw)
            .map(|list| Some(list.into_inner()))
            .map_err(|bad| {
                ValidationDetail::query(
                    key,
                    format!(
                        "Input should be a valid integer, unable to parse string as an integer: {:?}",
                        bad
                    ),
                    "int_parsing",
                )
            })
    }

    pub fn date_or_datetime(&self, key: &str) -> Result<Option<DateOrDateTime>, ValidationDetail> {
        match self.get(key)? {
            None => Ok(None),
            Some(v) => DateOrDateTime::parse(v).map(Some).ok_or_else(|| {
                ValidationDetail::query(
                    key,
                    "Input should be a valid datetime or date",
                    "datetime_from_date_parsing",
                )
            }),
        }
    }
}

/// `"1,2,3"` style list parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommaSeparatedList<T>(Vec<T>);

impl<T: FromStr> CommaSeparatedList<T> {
    /// Parses every raw value, splitting on commas. Returns the first item
    /// that failed to parse.
    pub fn parse(raw: &[&str]) -> Result<Self, String> {
        let mut items = Vec::new();
        for value in raw {
            for part in value.split(',') {
                let part = part.trim();
                let item = part.parse::<T>().map_err(|_| part.to_string())?;
                items.push(item);
            }
        }
        Ok(Self(items))
    }
}

impl<T> CommaSeparatedList<T> {
    pub fn into_inner(self) -> Vec<T> {
        self.0
    }
}

/// A date, a naive timestamp, or a timezone aware timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrDateTime {
    Date(NaiveDate),
    Naive(NaiveDateTime),
    Zoned(DateTime<FixedOffset>),
}

impl DateOrDateTime {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(Self::Zoned(dt));
        }
        for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
            if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
                return Some(Self::Zoned(dt));
            }
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
                return Some(Self::Naive(dt));
            }
        }
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .map(Self::Date)
    }

    pub fn is_zoned(&self) -> bool {
        matches!(self, Self::Zoned(_))
    }

    /// Calendar date in the value's own offset
    pub fn date(&self) -> NaiveDate {
        match self {
            Self::Date(d) => *d,
            Self::Naive(dt) => dt.date(),
            Self::Zoned(dt) => dt.date_naive(),
        }
    }

    pub fn to_sql(&self) -> SqlValue {
        match self {
            Self::Date(d) => SqlValue::Date(*d),
            Self::Naive(dt) => SqlValue::Timestamp(*dt),
            Self::Zoned(dt) => SqlValue::TimestampTz(*dt),
        }
    }
}

/// Truncates a float to `length` decimal places without rounding
pub fn truncate_float(value: f64, length: usize) -> f64 {
    let repr = format!("{}", value);
    match repr.split_once('.') {
        Some((whole, frac)) => {
            let frac: String = frac.chars().take(length).collect();
            if frac.is_empty() {
                whole.parse().unwrap_or(value)
            } else {
                format!("{}.{}", whole, frac).parse().unwrap_or(value)
            }
        }
        None => value,
    }
}

/// `parametersId` -> `parameters_id`
pub fn decamelize(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, ch) in key.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
