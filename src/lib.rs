//! mailsift — extract structured fields from semi-structured emails.
//!
//! Fetches unread messages matching a subject filter over IMAP, pulls
//! user-configured fields out of each body with label-based regexes,
//! optionally joins enrichment columns from a reference CSV by key, and
//! appends the records to a persistent output table.

pub mod coerce;
pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod mail;
pub mod run;
pub mod table;

pub use config::Settings;
pub use error::{Error, Result};
pub use run::{Orchestrator, RunReport};
