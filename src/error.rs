//! Error types for mailsift.

/// Top-level error type for a run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Table error: {0}")]
    Table(#[from] TableError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Settings file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse settings: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Duplicate field name in configuration: {0}")]
    DuplicateField(String),

    #[error("Field name {0} is reserved for message metadata")]
    ReservedField(String),

    #[error("No extraction fields configured")]
    NoFields,

    #[error("Invalid pattern for field {name}: {reason}")]
    InvalidPattern { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// IMAP transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    ConnectFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("IMAP login failed for {user}")]
    LoginFailed { user: String },

    #[error("IMAP command {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Fetch failed for message {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("Background task failed: {0}")]
    TaskJoin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// MIME decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Message could not be parsed as MIME")]
    Unparseable,
}

/// Reference/output table errors.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("Reference file not found: {0}")]
    NotFound(String),

    #[error("Required column {column} missing from {path}")]
    MissingColumn { column: String, path: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write output to {path}: {reason}")]
    WriteFailed { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
