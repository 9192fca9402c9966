//! Field specifications and extracted values.
//!
//! A [`FieldSpec`] is one user-configured extraction rule: a field name,
//! an optional explicit regex (otherwise the pattern is derived from the
//! name as a `Label: value` match), and the output format the raw capture
//! is coerced into.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Output format declared for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldFormat {
    Text,
    Number,
    Date,
}

/// One extraction rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name — unique within a spec set, doubles as the output column.
    pub name: String,
    /// Explicit regex with one capture group. `None` derives a
    /// label-based pattern from the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Format the captured value is coerced into.
    #[serde(default = "FieldFormat::text")]
    pub format: FieldFormat,
}

impl FieldFormat {
    fn text() -> Self {
        FieldFormat::Text
    }
}

impl FieldSpec {
    /// Label-derived spec with no explicit pattern.
    pub fn labeled(name: impl Into<String>, format: FieldFormat) -> Self {
        Self {
            name: name.into(),
            pattern: None,
            format,
        }
    }

    /// Spec with an explicit pattern.
    pub fn with_pattern(
        name: impl Into<String>,
        pattern: impl Into<String>,
        format: FieldFormat,
    ) -> Self {
        Self {
            name: name.into(),
            pattern: Some(pattern.into()),
            format,
        }
    }
}

/// A coerced field value.
///
/// The empty marker is `Value::Text("")` — coercion and extraction are
/// fail-soft and degrade to it (or to the raw text) rather than erroring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    /// ISO-8601 `YYYY-MM-DD` date string.
    Date(String),
}

impl Value {
    /// The explicit empty marker.
    pub fn empty() -> Self {
        Value::Text(String::new())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Text(s) if s.is_empty())
    }

    /// Cell text as written to the output table.
    pub fn as_cell(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) | Value::Date(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

/// One record per processed message: field name → coerced value,
/// in spec order. Total — every spec produces an entry, possibly empty.
pub type ExtractedRecord = IndexMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_marker_is_empty_text() {
        assert!(Value::empty().is_empty());
        assert!(!Value::Text("x".into()).is_empty());
        assert!(!Value::Number(0.0).is_empty());
    }

    #[test]
    fn value_display() {
        assert_eq!(Value::Text("abc".into()).as_cell(), "abc");
        assert_eq!(Value::Number(1234.56).as_cell(), "1234.56");
        assert_eq!(Value::Date("2024-01-31".into()).as_cell(), "2024-01-31");
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: FieldSpec = serde_json::from_str(r#"{"name": "Processo"}"#).unwrap();
        assert_eq!(spec.name, "Processo");
        assert!(spec.pattern.is_none());
        assert_eq!(spec.format, FieldFormat::Text);
    }

    #[test]
    fn spec_roundtrip() {
        let spec = FieldSpec::with_pattern("Valor", r"R\$([\d.,]+)", FieldFormat::Number);
        let json = serde_json::to_string(&spec).unwrap();
        let back: FieldSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "Valor");
        assert_eq!(back.pattern.as_deref(), Some(r"R\$([\d.,]+)"));
        assert_eq!(back.format, FieldFormat::Number);
    }
}
