// ❗ Error kinds for the ledger engine
//
// Persistence -> price catalog document (JSON file)
// Storage     -> ledger database (SQLite) and CSV imports
// Validation  -> rejected input, raised before anything is written

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("catalog persistence error at {path}: {message}")]
    Persistence { path: PathBuf, message: String },

    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },
}

impl LedgerError {
    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        LedgerError::Persistence {
            path: path.into(),
            message: err.to_string(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, LedgerError::Validation { .. })
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        LedgerError::Storage(format!("csv: {}", err))
    }
}
