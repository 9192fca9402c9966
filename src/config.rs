//! Persisted user settings.
//!
//! A JSON file holding connection parameters, the subject filter, the
//! field specs, and the optional join configuration. The IMAP password
//! is never persisted — the binary takes it from the environment.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::fields::FieldSpec;

/// Column names the orchestrator appends to every record; a field spec
/// may not reuse them or the extracted value would be overwritten.
pub const RESERVED_COLUMNS: [&str; 3] = ["Subject", "Sender", "Date"];

/// Enrichment configuration: which reference file to join against and
/// which of its columns to carry into the output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub reference_path: PathBuf,
    /// Extracted field whose value keys the lookup, which must also be a
    /// column of the reference file.
    pub key_field: String,
    pub extra_columns: Vec<String>,
}

/// One run's configuration, immutable for the duration of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub email_user: String,
    pub imap_host: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    pub search_subject: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    /// Whether an all-fields-empty record is still written as a row.
    #[serde(default = "default_true")]
    pub keep_empty_records: bool,
}

fn default_imap_port() -> u16 {
    993
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load and validate settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&raw)?;
        settings.validate()?;
        info!(path = %path.display(), fields = settings.fields.len(), "Settings loaded");
        Ok(settings)
    }

    /// Persist settings as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Settings saved");
        Ok(())
    }

    /// Structural validation, run at load time.
    ///
    /// Field names must be unique (mapping-overwrite semantics are not
    /// relied on), must not collide with the metadata columns appended
    /// to every record, and explicit patterns must at least compile. A
    /// pattern
    /// that compiles but captures nothing is left to degrade softly at
    /// extraction time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fields.is_empty() {
            return Err(ConfigError::NoFields);
        }

        let mut seen = std::collections::HashSet::new();
        for spec in &self.fields {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateField(spec.name.clone()));
            }
            if RESERVED_COLUMNS.contains(&spec.name.as_str()) {
                return Err(ConfigError::ReservedField(spec.name.clone()));
            }
            if let Some(pattern) = &spec.pattern
                && let Err(e) = Regex::new(pattern)
            {
                return Err(ConfigError::InvalidPattern {
                    name: spec.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldFormat, FieldSpec};

    fn base_settings() -> Settings {
        Settings {
            email_user: "user@example.com".into(),
            imap_host: "imap.example.com".into(),
            imap_port: 993,
            search_subject: "Intimação".into(),
            fields: vec![
                FieldSpec::labeled("Processo", FieldFormat::Text),
                FieldSpec::labeled("Valor", FieldFormat::Number),
            ],
            join: None,
            output_path: None,
            keep_empty_records: true,
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = base_settings();
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.email_user, "user@example.com");
        assert_eq!(loaded.imap_port, 993);
        assert_eq!(loaded.fields.len(), 2);
        assert!(loaded.keep_empty_records);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn duplicate_field_names_rejected() {
        let mut settings = base_settings();
        settings
            .fields
            .push(FieldSpec::labeled("Processo", FieldFormat::Text));
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField(name) if name == "Processo"));
    }

    #[test]
    fn empty_field_set_rejected() {
        let mut settings = base_settings();
        settings.fields.clear();
        assert!(matches!(settings.validate(), Err(ConfigError::NoFields)));
    }

    #[test]
    fn reserved_metadata_names_rejected() {
        let mut settings = base_settings();
        settings
            .fields
            .push(FieldSpec::labeled("Sender", FieldFormat::Text));
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ReservedField(name) if name == "Sender"));
    }

    #[test]
    fn invalid_explicit_pattern_rejected() {
        let mut settings = base_settings();
        settings
            .fields
            .push(FieldSpec::with_pattern("Quebrado", "([", FieldFormat::Text));
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { name, .. } if name == "Quebrado"));
    }

    #[test]
    fn defaults_applied_when_absent_from_json() {
        let json = r#"{
            "email_user": "u@example.com",
            "imap_host": "imap.example.com",
            "search_subject": "Alvará",
            "fields": [{"name": "Processo"}]
        }"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.imap_port, 993);
        assert!(settings.join.is_none());
        assert!(settings.keep_empty_records);
    }

    #[test]
    fn join_config_roundtrip() {
        let mut settings = base_settings();
        settings.join = Some(JoinConfig {
            reference_path: "clientes.csv".into(),
            key_field: "Processo".into(),
            extra_columns: vec!["Cliente".into()],
        });
        let json = serde_json::to_string(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        let join = back.join.unwrap();
        assert_eq!(join.key_field, "Processo");
        assert_eq!(join.extra_columns, ["Cliente"]);
    }
}
