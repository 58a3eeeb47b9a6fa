use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cim::parse_cim_datetime;
use crate::error::DecodeError;
use tracing::debug;

/// A single property value as returned by the query transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    TextArray(Vec<String>),
}

impl Value {
    /// Short type name used in decode errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::TextArray(_) => "text array",
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Float(v as f64),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextArray(v)
    }
}

impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::TextArray(v.into_iter().map(String::from).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Ordered field-name → value mapping for one result row.
///
/// Property names are matched ASCII case-insensitively, like the remote
/// protocol does.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for transports and tests.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or replace a field, keeping its original position on replace.
    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn present(&self, field: &'static str) -> Result<&Value, DecodeError> {
        match self.get(field) {
            None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
            Some(v) => Ok(v),
        }
    }

    fn mismatch(field: &'static str, expected: &'static str, found: &Value) -> DecodeError {
        DecodeError::TypeMismatch {
            field,
            expected,
            found: found.kind(),
        }
    }

    /// Required text; integers are rendered, since identifiers sometimes arrive numeric.
    pub fn text(&self, field: &'static str) -> Result<String, DecodeError> {
        match self.present(field)? {
            Value::Text(s) => Ok(s.clone()),
            Value::Integer(i) => Ok(i.to_string()),
            other => Err(Self::mismatch(field, "text", other)),
        }
    }

    pub fn opt_text(&self, field: &'static str) -> Option<String> {
        optional(self.text(field))
    }

    /// Required unsigned number. Performance counters frequently come back as text.
    pub fn u64(&self, field: &'static str) -> Result<u64, DecodeError> {
        let value = self.present(field)?;
        match value {
            Value::Integer(i) if *i >= 0 => Ok(*i as u64),
            Value::Float(f) if f.is_finite() && *f >= 0.0 => Ok(*f as u64),
            Value::Text(s) => s.trim().parse().map_err(|_| Self::mismatch(field, "unsigned number", value)),
            other => Err(Self::mismatch(field, "unsigned number", other)),
        }
    }

    pub fn opt_u64(&self, field: &'static str) -> Option<u64> {
        optional(self.u64(field))
    }

    pub fn bool(&self, field: &'static str) -> Result<bool, DecodeError> {
        let value = self.present(field)?;
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(i) => Ok(*i != 0),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(Self::mismatch(field, "bool", other)),
        }
    }

    pub fn opt_bool(&self, field: &'static str) -> Option<bool> {
        optional(self.bool(field))
    }

    /// Native timestamp, or CIM datetime text (`yyyymmddHHMMSS.ffffff+UUU`).
    pub fn timestamp(&self, field: &'static str) -> Result<DateTime<Utc>, DecodeError> {
        let value = self.present(field)?;
        match value {
            Value::Timestamp(t) => Ok(*t),
            Value::Text(s) => parse_cim_datetime(s).ok_or_else(|| Self::mismatch(field, "datetime", value)),
            other => Err(Self::mismatch(field, "datetime", other)),
        }
    }

    pub fn opt_timestamp(&self, field: &'static str) -> Option<DateTime<Utc>> {
        optional(self.timestamp(field))
    }

    /// Array of strings; a lone string is treated as a one-element array.
    pub fn text_array(&self, field: &'static str) -> Result<Vec<String>, DecodeError> {
        match self.present(field)? {
            Value::TextArray(items) => Ok(items.clone()),
            Value::Text(s) => Ok(vec![s.clone()]),
            other => Err(Self::mismatch(field, "text array", other)),
        }
    }

    pub fn opt_text_array(&self, field: &'static str) -> Option<Vec<String>> {
        optional(self.text_array(field))
    }
}

/// Optional fields never fail a row: absent and malformed both read as `None`.
fn optional<T>(result: Result<T, DecodeError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(DecodeError::MissingField(_)) => None,
        Err(e) => {
            debug!("Dropping malformed optional field: {}", e);
            None
        }
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(&name, value);
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let row = Row::new().with("DNSHostName", "web01");
        assert_eq!(row.text("dnshostname").unwrap(), "web01");
        assert_eq!(row.len(), 1);
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut row = Row::new().with("A", 1i64).with("B", 2i64);
        row.insert("a", 3i64);
        let names: Vec<_> = row.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(row.u64("A").unwrap(), 3);
    }

    #[test]
    fn test_null_counts_as_missing() {
        let row = Row::new().with("Name", Value::Null);
        assert_eq!(row.text("Name"), Err(DecodeError::MissingField("Name")));
        assert_eq!(row.opt_text("Name"), None);
    }

    #[test]
    fn test_numbers_from_text_and_float() {
        let row = Row::new()
            .with("BytesReceivedPersec", "1200")
            .with("Speed", 1_000_000_000.0f64)
            .with("Bad", "n/a");
        assert_eq!(row.u64("BytesReceivedPersec").unwrap(), 1200);
        assert_eq!(row.u64("Speed").unwrap(), 1_000_000_000);
        assert!(matches!(row.u64("Bad"), Err(DecodeError::TypeMismatch { field: "Bad", .. })));
        assert_eq!(row.opt_u64("Bad"), None);
        assert_eq!(row.opt_u64("Speed"), Some(1_000_000_000));
    }

    #[test]
    fn test_malformed_optional_timestamp_reads_as_none() {
        let row = Row::new().with("LastBootUpTime", "yesterday");
        assert!(row.timestamp("LastBootUpTime").is_err());
        assert_eq!(row.opt_timestamp("LastBootUpTime"), None);
    }

    #[test]
    fn test_negative_is_not_unsigned() {
        let row = Row::new().with("X", -5i64);
        assert!(row.u64("X").is_err());
    }

    #[test]
    fn test_bool_variants() {
        let row = Row::new().with("A", true).with("B", "False").with("C", 1i64);
        assert!(row.bool("A").unwrap());
        assert!(!row.bool("B").unwrap());
        assert!(row.bool("C").unwrap());
    }

    #[test]
    fn test_timestamp_from_cim_text() {
        let row = Row::new().with("LastBootUpTime", "20240102030405.000000+000");
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(row.timestamp("LastBootUpTime").unwrap(), expected);
    }

    #[test]
    fn test_text_array_accepts_single_text() {
        let row = Row::new().with("IPAddress", "10.0.0.5").with("IPSubnet", vec!["255.0.0.0", "64"]);
        assert_eq!(row.text_array("IPAddress").unwrap(), vec!["10.0.0.5"]);
        assert_eq!(row.text_array("IPSubnet").unwrap().len(), 2);
        assert_eq!(row.opt_text_array("Missing"), None);
    }
}
