use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV parsing failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing required dependency: {0}")]
    MissingDependency(String),

    #[error("Could not parse date cell '{cell}': {reason}")]
    DateParse { cell: String, reason: String },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Uniqueness violation: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("{what} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        what: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ImportError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ImportError::Http(e) => !e.is_builder() && !e.is_decode(),
            ImportError::Transient(_) => true,
            _ => false,
        }
    }

    /// Errors from the catalogue itself. These stop a run; failures of an
    /// external service only skip the item being processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::Conflict(_)
                | ImportError::Storage(_)
                | ImportError::Sqlite(_)
                | ImportError::Io(_)
                | ImportError::MissingDependency(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
