//! # Orgload - bulk import of organizations and addresses
//!
//! Orgload reads a CSV file of organizations and their addresses, validates every
//! row, folds rows sharing a registration number into one organization, and writes
//! the whole batch to SQLite in a single transaction.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Headers   │────▶│  Collector  │────▶│   Creator   │
//! │ (UTF8/auto) │     │  (required) │     │ (rows+dedup)│     │ (1 tx, all  │
//! └─────────────┘     └─────────────┘     └─────────────┘     │  or none)   │
//!                                                             └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chrono::Utc;
//! use orgload::{import, ImportOptions, Source, Store};
//!
//! let mut store = Store::open("orgload.db")?;
//! let outcome = import(&Source::path("companies.csv"), &mut store, &ImportOptions::default(), Utc::now())?;
//! println!("{} line errors", outcome.errors().len());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Import rows, new and stored records, row errors
//! - [`config`] - Import options and policies
//! - [`parser`] - Input sources, encoding and delimiter detection
//! - [`import`] - Header check, row validation, dedup and bulk write
//! - [`store`] - SQLite storage
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;
pub mod config;

// Parsing
pub mod parser;

// Import pipeline
pub mod import;

// Storage
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    BulkInsertError,
    ConfigError,
    FailedRecord,
    FailedRecords,
    ImportError,
    RecordKind,
    ServerError,
    StructuralError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ImportRow,
    NewAddress,
    NewOrganization,
    RowError,
    StoredAddress,
    StoredOrganization,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{ConflictPolicy, EncodingMode, ImportOptions, RowErrorPolicy};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_delimiter,
    detect_encoding,
    prepare_source,
    Source,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use import::{
    check,
    import,
    Creator,
    HeaderValidator,
    ImportOutcome,
    ImportSummary,
    ReadOutput,
    Reader,
    RowValidator,
    REQUIRED_HEADERS,
};

// =============================================================================
// Re-exports - Storage
// =============================================================================

pub use store::Store;

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    ImportMetadata,
    ImportResponse,
    bulk_insert_response,
    error_response,
    rejected_response,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
