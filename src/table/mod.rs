//! Tabular datasets: the read-only reference table joined against each
//! record, and the persistent output table records accumulate into.

pub mod output;
pub mod reference;

pub use output::{OutputWriter, WriteOutcome};
pub use reference::ReferenceTable;
