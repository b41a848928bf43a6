//! Error types for the record store and table codec
//!
//! Referential-integrity issues are never errors here: they surface as
//! [`crate::problem::Problem`]s. Only bad input data and I/O end up in these
//! enums.

use crate::record::{RecordId, RecordType};
use thiserror::Error;

/// Failure converting between a field map and a [`crate::record::Record`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("invalid record identifier `{0}`")]
    InvalidIdentifier(String),

    #[error("invalid reference `{value}` in field `{field}`")]
    InvalidReference { field: String, value: String },

    #[error("unknown record type `{0}`")]
    UnknownType(String),

    #[error("record {id} already has type {existing}, not {found}")]
    ConflictingType {
        id: RecordId,
        existing: RecordType,
        found: RecordType,
    },
}

/// Failure reading or writing a serialized table
#[derive(Error, Debug)]
pub enum TableFileError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("table has no header row")]
    EmptyFile,

    #[error("table header has no `uuid` column")]
    MissingIdentifierColumn,

    #[error("row at line {line} has more fields than the header")]
    RowTooWide { line: u64 },

    #[error("row at line {line} has an empty identifier")]
    MissingIdentifier { line: u64 },

    #[error("record error: {0}")]
    Record(#[from] RecordError),
}

/// Failure saving or restoring record mementos
#[derive(Error, Debug)]
pub enum MementoError {
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
