use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// Every failure aborts the whole run; nothing here is recovered locally.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Request Error: HTTP request to {url} failed with status {status}")]
    Fetch { url: String, status: u16 },

    #[error("Request Error: HTTP request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Decode Error: payload from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },

    #[error("Parse Error: {context}: {message}")]
    Parse { context: String, message: String },

    #[error("Integrity Error: {entity} {violation}")]
    Integrity { entity: String, violation: Violation },

    #[error("Connection Error: cannot open database {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Config Error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Task(String),

    #[error("File Error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON Error: {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Why a dependent row could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("references unknown {kind} '{key}'")]
    UnknownKey { kind: &'static str, key: String },

    #[error("appears more than once in the input")]
    Duplicate,
}

impl CatalogError {
    pub fn parse(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Transient statuses that a retrying fetcher may try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Fetch { status, .. } => *status == 429 || (500..=599).contains(status),
            Self::Request { .. } => true,
            _ => false,
        }
    }
}
