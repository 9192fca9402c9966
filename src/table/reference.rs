//! Reference table — enrichment columns looked up by key.
//!
//! Loaded at most once per run from a CSV with a header row. Column names
//! are matched by exact string equality against the configured key/extra
//! field names; a missing column makes the whole table unusable for the
//! run (the caller disables the join, once, rather than erroring per row).

use std::path::Path;

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::error::TableError;

/// An in-memory reference dataset with a designated key column.
#[derive(Debug)]
pub struct ReferenceTable {
    key_index: usize,
    /// (column name, column index) for each configured extra column.
    extra: Vec<(String, usize)>,
    rows: Vec<Vec<String>>,
}

impl ReferenceTable {
    /// Load and validate a reference CSV.
    ///
    /// Fails with [`TableError::MissingColumn`] if the key column or any
    /// extra column is absent from the header.
    pub fn load(
        path: &Path,
        key_column: &str,
        extra_columns: &[String],
    ) -> Result<Self, TableError> {
        if !path.exists() {
            return Err(TableError::NotFound(path.display().to_string()));
        }

        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

        let position = |column: &str| -> Result<usize, TableError> {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| TableError::MissingColumn {
                    column: column.to_string(),
                    path: path.display().to_string(),
                })
        };

        let key_index = position(key_column)?;
        let extra = extra_columns
            .iter()
            .map(|c| Ok((c.clone(), position(c)?)))
            .collect::<Result<Vec<_>, TableError>>()?;

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        info!(
            path = %path.display(),
            rows = rows.len(),
            key = key_column,
            "Reference table loaded"
        );

        Ok(Self {
            key_index,
            extra,
            rows,
        })
    }

    /// Look up the extra columns for a key value.
    ///
    /// Exact equality on the key cell, first matching row wins when the
    /// key is not unique. No match returns an empty map and warns with
    /// the attempted key.
    pub fn lookup(&self, key_value: &str) -> IndexMap<String, String> {
        let row = self
            .rows
            .iter()
            .find(|row| row.get(self.key_index).is_some_and(|cell| cell == key_value));

        match row {
            Some(row) => self
                .extra
                .iter()
                .map(|(name, idx)| {
                    (name.clone(), row.get(*idx).cloned().unwrap_or_default())
                })
                .collect(),
            None => {
                warn!(key = key_value, "No reference row found for key");
                IndexMap::new()
            }
        }
    }
}
