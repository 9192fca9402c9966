//! Value coercion — raw captured text to a typed [`Value`].
//!
//! Fail-soft by contract: a value that does not parse under its declared
//! format is logged and returned as raw text, so one bad field never
//! aborts the rest of a record.

use tracing::warn;

use crate::fields::{FieldFormat, Value};

/// Currency markers stripped before numeric parsing.
const CURRENCY_SYMBOLS: [&str; 4] = ["R$", "$", "€", "£"];

/// Coerce a raw matched string into a typed value per the declared format.
///
/// An empty raw string short-circuits to the empty marker regardless of
/// format.
pub fn coerce(raw: &str, format: FieldFormat) -> Value {
    if raw.is_empty() {
        return Value::empty();
    }
    match format {
        FieldFormat::Text => Value::Text(raw.to_string()),
        FieldFormat::Number => coerce_number(raw),
        FieldFormat::Date => coerce_date(raw),
    }
}

/// Parse a decimal that may use `1.234,56`-style separators.
///
/// If a comma is present, dots are thousands separators and the comma is
/// the decimal point. Currency symbols and whitespace are stripped first.
fn coerce_number(raw: &str) -> Value {
    let mut cleaned = raw.to_string();
    for symbol in CURRENCY_SYMBOLS {
        cleaned = cleaned.replace(symbol, "");
    }
    cleaned.retain(|c| !c.is_whitespace());

    if cleaned.contains(',') {
        cleaned = cleaned.replace('.', "").replace(',', ".");
    }

    match cleaned.parse::<f64>() {
        Ok(n) => Value::Number(n),
        Err(_) => {
            warn!(raw, "Value did not parse as a number, keeping raw text");
            Value::Text(raw.to_string())
        }
    }
}

/// Re-emit a `dd/mm/yyyy` date as `YYYY-MM-DD`.
///
/// Only slash-separated day/month/year is recognized; anything else is
/// returned unchanged.
fn coerce_date(raw: &str) -> Value {
    if !raw.contains('/') {
        return Value::Text(raw.to_string());
    }

    let parts: Vec<&str> = raw.split('/').map(str::trim).collect();
    if parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit())) {
        let (day, month, year) = (parts[0], parts[1], parts[2]);
        Value::Date(format!("{year}-{month:0>2}-{day:0>2}"))
    } else {
        warn!(raw, "Value did not parse as a dd/mm/yyyy date, keeping raw text");
        Value::Text(raw.to_string())
    }
}
