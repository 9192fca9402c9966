//! Output table — accumulated records appended to a persistent CSV.
//!
//! Append semantics across runs: the column set is the union of every
//! field name ever written, existing rows always precede new rows, and
//! missing cells in either direction are filled with an explicit empty
//! marker. The combined table is fully materialized in memory and then
//! swapped in with an atomic rename, never a partial overwrite.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use crate::coerce::coerce;
use crate::error::TableError;
use crate::fields::{ExtractedRecord, FieldFormat, FieldSpec, Value};

/// Filename prefix for auto-named output files. The embedded
/// `%Y%m%d_%H%M%S` timestamp keeps lexicographic order = chronological
/// order; picking the "latest" file depends on that.
const OUTPUT_PREFIX: &str = "extracted_records_";
const OUTPUT_EXT: &str = ".csv";

/// Result of a write call.
#[derive(Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// No records this run — nothing created or modified.
    NothingToWrite,
    Written {
        path: PathBuf,
        rows_appended: usize,
        total_rows: usize,
    },
}

/// Writes a run's records to the output table.
pub struct OutputWriter {
    /// Declared format per field name, for the final typing pass.
    formats: HashMap<String, FieldFormat>,
}

impl OutputWriter {
    pub fn new(specs: &[FieldSpec]) -> Self {
        let formats = specs
            .iter()
            .map(|s| (s.name.clone(), s.format))
            .collect();
        Self { formats }
    }

    /// Persist a run's records, merging with any existing table at the
    /// target path. With no explicit path the auto-naming policy picks
    /// the latest matching file in the working directory.
    pub fn write(
        &self,
        records: &[ExtractedRecord],
        path: Option<&Path>,
    ) -> Result<WriteOutcome, TableError> {
        if records.is_empty() {
            info!("Nothing to write");
            return Ok(WriteOutcome::NothingToWrite);
        }

        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let cwd = std::env::current_dir()?;
                auto_output_path(&cwd)
            }
        };

        // Existing table, if readable. A corrupt or unreadable file falls
        // back to create-fresh rather than aborting the run.
        let (mut columns, mut rows) = match read_existing(&path) {
            Ok(Some((cols, rows))) => (cols, rows),
            Ok(None) => (Vec::new(), Vec::new()),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Existing output unreadable, creating fresh file");
                (Vec::new(), Vec::new())
            }
        };
        let existing_rows = rows.len();

        // Column union: existing order first, then new columns in
        // first-seen order across this run's records.
        for record in records {
            for name in record.keys() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.clone());
                }
            }
        }

        // Pad pre-existing rows out to the widened column set.
        for row in &mut rows {
            row.resize(columns.len(), String::new());
        }

        for record in records {
            let row = columns
                .iter()
                .map(|col| record.get(col).map(Value::as_cell).unwrap_or_default())
                .collect();
            rows.push(row);
        }

        // Final typing pass over the whole table: declared number/date
        // columns get canonical text, with null-on-failure.
        for (idx, column) in columns.iter().enumerate() {
            if let Some(&format) = self.formats.get(column) {
                if format == FieldFormat::Text {
                    continue;
                }
                for row in &mut rows {
                    row[idx] = type_cell(&row[idx], format);
                }
            }
        }

        write_atomic(&path, &columns, &rows)?;

        info!(
            path = %path.display(),
            appended = records.len(),
            total = rows.len(),
            "Output table written"
        );

        Ok(WriteOutcome::Written {
            path,
            rows_appended: rows.len() - existing_rows,
            total_rows: rows.len(),
        })
    }
}

/// Auto-naming policy: lexicographically last existing
/// `extracted_records_*.csv` in `dir`, else a new name with the current
/// timestamp embedded.
pub fn auto_output_path(dir: &Path) -> PathBuf {
    let mut candidates: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().into_string().ok())
                .filter(|n| n.starts_with(OUTPUT_PREFIX) && n.ends_with(OUTPUT_EXT))
                .collect()
        })
        .unwrap_or_default();

    candidates.sort();
    match candidates.pop() {
        Some(latest) => {
            info!(file = %latest, "Appending to existing output file");
            dir.join(latest)
        }
        None => {
            let stamp = Local::now().format("%Y%m%d_%H%M%S");
            dir.join(format!("{OUTPUT_PREFIX}{stamp}{OUTPUT_EXT}"))
        }
    }
}

/// Read the current table, or `None` if the file does not exist.
fn read_existing(path: &Path) -> Result<Option<(Vec<String>, Vec<Vec<String>>)>, TableError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(columns.len(), String::new());
        rows.push(row);
    }
    Ok(Some((columns, rows)))
}

/// Write the combined table to a sibling temp file, then rename over the
/// target so readers never observe a partial file.
fn write_atomic(path: &Path, columns: &[String], rows: &[Vec<String>]) -> Result<(), TableError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        writer.write_record(columns)?;
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path).map_err(|e| TableError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Canonicalize one cell under its column's declared format.
/// Failures become the empty marker, never an error.
fn type_cell(cell: &str, format: FieldFormat) -> String {
    if cell.is_empty() {
        return String::new();
    }
    match format {
        FieldFormat::Text => cell.to_string(),
        FieldFormat::Number => match coerce(cell, FieldFormat::Number) {
            Value::Number(n) => n.to_string(),
            _ => String::new(),
        },
        FieldFormat::Date => {
            // Cells from earlier runs are already ISO.
            if is_iso_date(cell) {
                return cell.to_string();
            }
            match coerce(cell, FieldFormat::Date) {
                Value::Date(s) => s,
                _ => String::new(),
            }
        }
    }
}

fn is_iso_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'-'
        && b[7] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| matches!(i, 4 | 7) || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn record(pairs: &[(&str, Value)]) -> ExtractedRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<IndexMap<_, _>>()
    }

    fn read_table(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let columns = reader.headers().unwrap().iter().map(str::to_string).collect();
        let rows = reader
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect();
        (columns, rows)
    }

    #[test]
    fn empty_input_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = OutputWriter::new(&[]);
        let outcome = writer.write(&[], Some(&path)).unwrap();
        assert_eq!(outcome, WriteOutcome::NothingToWrite);
        assert!(!path.exists());
    }

    #[test]
    fn creates_file_with_first_seen_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = OutputWriter::new(&[]);
        let records = vec![
            record(&[("A", Value::Text("1".into())), ("B", Value::Text("2".into()))]),
            record(&[("A", Value::Text("3".into())), ("C", Value::Text("4".into()))]),
        ];
        writer.write(&records, Some(&path)).unwrap();

        let (columns, rows) = read_table(&path);
        assert_eq!(columns, ["A", "B", "C"]);
        assert_eq!(rows[0], ["1", "2", ""]);
        assert_eq!(rows[1], ["3", "", "4"]);
    }

    #[test]
    fn two_runs_append_with_column_union() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = OutputWriter::new(&[]);

        let first = vec![record(&[("A", Value::Text("a1".into()))])];
        let second = vec![record(&[
            ("A", Value::Text("a2".into())),
            ("B", Value::Text("b2".into())),
        ])];

        writer.write(&first, Some(&path)).unwrap();
        let outcome = writer.write(&second, Some(&path)).unwrap();

        let (columns, rows) = read_table(&path);
        assert_eq!(columns, ["A", "B"]);
        assert_eq!(rows.len(), 2);
        // First run's rows precede the second's, old rows gain the empty
        // marker for the new column.
        assert_eq!(rows[0], ["a1", ""]);
        assert_eq!(rows[1], ["a2", "b2"]);
        assert!(matches!(
            outcome,
            WriteOutcome::Written {
                rows_appended: 1,
                total_rows: 2,
                ..
            }
        ));
    }

    #[test]
    fn unreadable_existing_file_falls_back_to_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        // Invalid UTF-8 in a data row makes the existing file unreadable.
        std::fs::write(&path, b"A,B\n\xff\xfe,1\n").unwrap();

        let writer = OutputWriter::new(&[]);
        let records = vec![record(&[("A", Value::Text("1".into()))])];
        writer.write(&records, Some(&path)).unwrap();

        let (columns, rows) = read_table(&path);
        assert_eq!(columns, ["A"]);
        assert_eq!(rows, vec![vec!["1".to_string()]]);
    }

    #[test]
    fn typing_pass_canonicalizes_numbers_and_dates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let specs = [
            FieldSpec::labeled("Valor", FieldFormat::Number),
            FieldSpec::labeled("Data", FieldFormat::Date),
        ];
        let writer = OutputWriter::new(&specs);
        let records = vec![
            record(&[
                ("Valor", Value::Number(1000.5)),
                ("Data", Value::Date("2024-01-31".into())),
            ]),
            // Coercion failed upstream and kept raw text; the typing
            // pass nulls these out instead of erroring.
            record(&[
                ("Valor", Value::Text("n/a".into())),
                ("Data", Value::Text("unknown".into())),
            ]),
        ];
        writer.write(&records, Some(&path)).unwrap();

        let (_, rows) = read_table(&path);
        assert_eq!(rows[0], ["1000.5", "2024-01-31"]);
        assert_eq!(rows[1], ["", ""]);
    }

    #[test]
    fn typing_pass_preserves_iso_dates_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let specs = [FieldSpec::labeled("Data", FieldFormat::Date)];
        let writer = OutputWriter::new(&specs);

        writer
            .write(&[record(&[("Data", Value::Date("2024-01-31".into()))])], Some(&path))
            .unwrap();
        writer
            .write(&[record(&[("Data", Value::Date("2024-02-01".into()))])], Some(&path))
            .unwrap();

        let (_, rows) = read_table(&path);
        assert_eq!(rows[0], ["2024-01-31"]);
        assert_eq!(rows[1], ["2024-02-01"]);
    }

    #[test]
    fn auto_path_picks_lexicographically_last() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("extracted_records_20240101_090000.csv"), "A\n").unwrap();
        std::fs::write(dir.path().join("extracted_records_20240301_090000.csv"), "A\n").unwrap();
        std::fs::write(dir.path().join("unrelated.csv"), "A\n").unwrap();

        let path = auto_output_path(dir.path());
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "extracted_records_20240301_090000.csv"
        );
    }

    #[test]
    fn auto_path_generates_timestamped_name_when_none_exist() {
        let dir = tempfile::tempdir().unwrap();
        let path = auto_output_path(dir.path());
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(OUTPUT_PREFIX));
        assert!(name.ends_with(OUTPUT_EXT));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let writer = OutputWriter::new(&[]);
        writer
            .write(&[record(&[("A", Value::Text("1".into()))])], Some(&path))
            .unwrap();
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
