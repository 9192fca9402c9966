//! Field extractor — regex matching over decoded message bodies.
//!
//! Label-derived specs use a two-tier match: a strict `Label: value`
//! pattern first, then a loose variant with the colon optional. The tier
//! order is deliberate (precision before tolerance for formatting drift
//! in the source emails) and must stay a fallback chain, not one merged
//! regex.

use regex::Regex;
use tracing::warn;

use crate::coerce::coerce;
use crate::fields::{ExtractedRecord, FieldFormat, FieldSpec, Value};

/// A spec set compiled once per run.
pub struct FieldExtractor {
    compiled: Vec<CompiledSpec>,
}

struct CompiledSpec {
    name: String,
    format: FieldFormat,
    matcher: Matcher,
}

enum Matcher {
    /// User-supplied regex with at least one capture group.
    Explicit(Regex),
    /// Derived from the field name: strict colon, then colon-optional.
    Labeled { strict: Regex, loose: Regex },
    /// Explicit pattern was unusable — the field always extracts empty.
    Unusable,
}

impl FieldExtractor {
    /// Compile a spec set. Unusable explicit patterns (invalid regex or
    /// no capture group) are warned once here and extract as empty.
    pub fn new(specs: &[FieldSpec]) -> Self {
        let compiled = specs
            .iter()
            .map(|spec| {
                let matcher = match &spec.pattern {
                    Some(pattern) => match Regex::new(pattern) {
                        Ok(re) if re.captures_len() > 1 => Matcher::Explicit(re),
                        Ok(_) => {
                            warn!(
                                field = %spec.name,
                                pattern = %pattern,
                                "Pattern has no capture group; field will always be empty"
                            );
                            Matcher::Unusable
                        }
                        Err(e) => {
                            warn!(
                                field = %spec.name,
                                pattern = %pattern,
                                error = %e,
                                "Invalid pattern; field will always be empty"
                            );
                            Matcher::Unusable
                        }
                    },
                    None => {
                        let label = regex::escape(&spec.name);
                        // Derived patterns only fail on a pathological
                        // label, which escape() rules out.
                        let strict = Regex::new(&format!(r"{label}:\s*([^\r\n]+)"))
                            .expect("escaped label regex");
                        let loose = Regex::new(&format!(r"{label}\s*:?\s*([^\r\n]+)"))
                            .expect("escaped label regex");
                        Matcher::Labeled { strict, loose }
                    }
                };
                CompiledSpec {
                    name: spec.name.clone(),
                    format: spec.format,
                    matcher,
                }
            })
            .collect();
        Self { compiled }
    }

    /// Extract every configured field from a message body.
    ///
    /// The result is total: every spec yields an entry, in spec order. A
    /// field whose pattern does not match is recorded as empty and
    /// warned; it never aborts the other fields.
    pub fn extract(&self, body: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord::new();
        for spec in &self.compiled {
            let captured = match &spec.matcher {
                Matcher::Explicit(re) => first_capture(re, body),
                Matcher::Labeled { strict, loose } => {
                    first_capture(strict, body).or_else(|| first_capture(loose, body))
                }
                Matcher::Unusable => None,
            };

            let value = match captured {
                Some(raw) => coerce(raw.trim(), spec.format),
                None => {
                    warn!(field = %spec.name, "Field not found in message body");
                    Value::empty()
                }
            };
            record.insert(spec.name.clone(), value);
        }
        record
    }
}

fn first_capture<'t>(re: &Regex, text: &'t str) -> Option<&'t str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}
