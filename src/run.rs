//! Run orchestrator — one batch of messages, one write.
//!
//! Per message: fetch → decode → extract → join (optional) → accumulate.
//! Any per-message failure is logged with the message id and the run
//! moves on; only transport search failures and a terminal write failure
//! surface as run errors.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::{JoinConfig, RESERVED_COLUMNS, Settings};
use crate::error::{Error, Result};
use crate::extract::FieldExtractor;
use crate::fields::{ExtractedRecord, Value};
use crate::mail::{MailTransport, decode};
use crate::table::{OutputWriter, ReferenceTable, WriteOutcome};

/// Summary reported after every run.
#[derive(Debug)]
pub struct RunReport {
    /// Messages the transport returned and we attempted to process.
    pub attempted: usize,
    /// Records that made it into the accumulator.
    pub accumulated: usize,
    /// Outcome of the single final write.
    pub write: WriteOutcome,
}

/// Reference table state for the run: loaded at most once, lazily, and
/// disabled for the whole run if loading fails.
enum RefState {
    NotLoaded,
    Ready(ReferenceTable),
    Unusable,
}

/// Sequences one extraction run over a mail transport.
pub struct Orchestrator {
    settings: Settings,
    transport: Arc<dyn MailTransport>,
}

impl Orchestrator {
    pub fn new(settings: Settings, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    /// Execute one run to completion. Messages are processed strictly in
    /// the order the transport returned them; the writer runs exactly
    /// once at the end.
    pub async fn run(&self) -> Result<RunReport> {
        let ids = self.transport.search(&self.settings.search_subject).await?;
        info!(count = ids.len(), subject = %self.settings.search_subject, "Starting run");

        let extractor = FieldExtractor::new(&self.settings.fields);
        let mut reference = RefState::NotLoaded;
        let mut accumulator: Vec<ExtractedRecord> = Vec::new();
        let mut processed_ids: Vec<String> = Vec::new();

        for id in &ids {
            match self.process_message(id, &extractor, &mut reference).await {
                Ok(Some(record)) => {
                    accumulator.push(record);
                    processed_ids.push(id.clone());
                }
                Ok(None) => {
                    // Dropped by the empty-record policy; still consumed.
                    processed_ids.push(id.clone());
                }
                Err(e) => {
                    error!(id = %id, error = %e, "Failed to process message, skipping");
                }
            }
        }

        if !processed_ids.is_empty()
            && let Err(e) = self.transport.mark_seen(&processed_ids).await
        {
            warn!(error = %e, "Failed to mark processed messages as seen");
        }

        let attempted = ids.len();
        let accumulated = accumulator.len();

        let writer = OutputWriter::new(&self.settings.fields);
        match writer.write(&accumulator, self.settings.output_path.as_deref()) {
            Ok(write) => {
                info!(attempted, accumulated, "Run complete");
                Ok(RunReport {
                    attempted,
                    accumulated,
                    write,
                })
            }
            Err(e) => {
                error!(attempted, accumulated, error = %e, "Final write failed, run data not persisted");
                Err(Error::Table(e))
            }
        }
    }

    /// Fetch, decode, extract, and join one message. `Ok(None)` means the
    /// record was dropped by the empty-record policy.
    async fn process_message(
        &self,
        id: &str,
        extractor: &FieldExtractor,
        reference: &mut RefState,
    ) -> Result<Option<ExtractedRecord>> {
        let raw = self.transport.fetch(id).await?;
        let message = decode(&raw)?;

        debug!(id, subject = %message.subject, sender = %message.sender, "Processing message");

        let mut record = extractor.extract(&message.body);

        let all_empty = record.values().all(Value::is_empty);
        if all_empty && !self.settings.keep_empty_records {
            warn!(id, subject = %message.subject, "No fields extracted, dropping record");
            return Ok(None);
        }
        if all_empty {
            warn!(id, subject = %message.subject, "No fields extracted, accumulating empty record");
        }

        if let Some(join) = &self.settings.join {
            self.join_record(&mut record, join, reference);
        }

        // Message metadata columns, as trailing columns on every record.
        // The names are reserved at validation so no extracted field is
        // overwritten here.
        let [subject, sender, date] = RESERVED_COLUMNS;
        record.insert(subject.into(), Value::Text(message.subject));
        record.insert(sender.into(), Value::Text(message.sender));
        record.insert(date.into(), Value::Text(message.date));

        Ok(Some(record))
    }

    /// Enrich a record from the reference table. Loads the table on the
    /// first call; a load failure disables the join for the whole run.
    fn join_record(&self, record: &mut ExtractedRecord, join: &JoinConfig, state: &mut RefState) {
        let key_value = match record.get(&join.key_field) {
            Some(v) if !v.is_empty() => v.as_cell(),
            _ => return, // empty key: no lookup attempted
        };

        if let RefState::NotLoaded = state {
            *state = match ReferenceTable::load(
                &join.reference_path,
                &join.key_field,
                &join.extra_columns,
            ) {
                Ok(table) => RefState::Ready(table),
                Err(e) => {
                    error!(error = %e, "Reference table unusable, join disabled for this run");
                    RefState::Unusable
                }
            };
        }

        if let RefState::Ready(table) = state {
            for (column, value) in table.lookup(&key_value) {
                record.insert(column, Value::Text(value));
            }
        }
    }
}
