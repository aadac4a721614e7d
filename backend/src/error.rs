//! Error types for the Orgload import pipeline.
//!
//! This module defines the error hierarchy used across the pipeline:
//!
//! - [`StructuralError`] - Bad headers or malformed CSV (nothing can be processed)
//! - [`BulkInsertError`] - Records rejected by storage during the atomic write
//! - [`ImportError`] - Top-level orchestration errors
//! - [`ConfigError`] - Invalid configuration values
//! - [`ServerError`] - HTTP adapter errors
//!
//! Per-row validation failures are not errors in this sense: they are plain
//! [`crate::models::RowError`] values collected alongside the valid rows.
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Structural Errors
// =============================================================================

/// Errors that prevent any row from being processed.
#[derive(Debug, Error)]
pub enum StructuralError {
    /// Header row lacks one or more required columns.
    #[error("Missing required headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    /// CSV content could not be parsed (bad quoting, invalid encoding...).
    #[error("{0}")]
    Malformed(String),
}

// =============================================================================
// Bulk Insert Errors
// =============================================================================

/// Which batch a failed record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Organization,
    Address,
}

/// One record rejected by storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRecord {
    pub kind: RecordKind,
    /// Position of the record in the set handed to the writer.
    pub index: usize,
    /// Natural key of the organization (or of the organization the address links to).
    pub registration_number: String,
    /// Message reported by the storage engine.
    pub reason: String,
}

/// Every record rejected during one write, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedRecords {
    pub organizations: Vec<FailedRecord>,
    pub addresses: Vec<FailedRecord>,
}

impl FailedRecords {
    pub fn is_empty(&self) -> bool {
        self.organizations.is_empty() && self.addresses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.organizations.len() + self.addresses.len()
    }

    pub fn push(&mut self, record: FailedRecord) {
        match record.kind {
            RecordKind::Organization => self.organizations.push(record),
            RecordKind::Address => self.addresses.push(record),
        }
    }
}

/// Aggregated write failure. The transaction was rolled back.
#[derive(Debug, Clone, Error)]
#[error(
    "Failed to insert some records ({} organizations, {} addresses)",
    .failed_records.organizations.len(),
    .failed_records.addresses.len()
)]
pub struct BulkInsertError {
    pub failed_records: FailedRecords,
}

impl BulkInsertError {
    pub fn new(failed_records: FailedRecords) -> Self {
        Self { failed_records }
    }
}

// =============================================================================
// Import Errors (top-level)
// =============================================================================

/// Top-level import errors.
///
/// This is the error type returned by [`crate::import::pipeline::import`].
/// Row-level validation problems never show up here.
#[derive(Debug, Error)]
pub enum ImportError {
    /// Input could not be opened or read.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// Header or CSV structure is unusable.
    #[error("Malformed CSV file: {0}")]
    Structural(#[from] StructuralError),

    /// Storage rejected some records; nothing was persisted.
    #[error(transparent)]
    BulkInsert(#[from] BulkInsertError),

    /// Storage engine failure outside of record constraints.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ImportError {
    /// Build from a csv error, keeping I/O failures distinct from malformed content.
    pub fn from_csv(err: csv::Error) -> Self {
        if !err.is_io_error() {
            return StructuralError::Malformed(err.to_string()).into();
        }
        match err.into_kind() {
            csv::ErrorKind::Io(e) => ImportError::Io(e),
            other => StructuralError::Malformed(format!("{:?}", other)).into(),
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {key}: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Import error.
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, rusqlite::Error>;

/// Result type for configuration parsing.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_headers_message() {
        let err = StructuralError::MissingHeaders(vec!["city".into(), "country".into()]);
        assert_eq!(err.to_string(), "Missing required headers: city, country");

        let import_err: ImportError = err.into();
        assert_eq!(
            import_err.to_string(),
            "Malformed CSV file: Missing required headers: city, country"
        );
    }

    #[test]
    fn test_failed_records_grouping() {
        let mut failed = FailedRecords::default();
        assert!(failed.is_empty());

        failed.push(FailedRecord {
            kind: RecordKind::Address,
            index: 2,
            registration_number: "111".into(),
            reason: "CHECK constraint failed".into(),
        });

        assert_eq!(failed.len(), 1);
        assert!(failed.organizations.is_empty());
        assert_eq!(failed.addresses[0].index, 2);

        let err = BulkInsertError::new(failed);
        assert!(err.to_string().contains("0 organizations, 1 addresses"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ImportError::from_csv(csv::Error::from(io));
        assert!(matches!(err, ImportError::Io(_)));
    }
}
