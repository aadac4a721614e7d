//! High-level import API: header check → collect → atomic write.
//!
//! # Example
//!
//! ```rust,ignore
//! use chrono::Utc;
//! use orgload::{import, ImportOptions, ImportOutcome, Source, Store};
//!
//! let mut store = Store::open("orgload.db")?;
//! let source = Source::path("companies.csv");
//!
//! match import(&source, &mut store, &ImportOptions::default(), Utc::now())? {
//!     ImportOutcome::Malformed(error) => eprintln!("{:?}", error.errors),
//!     ImportOutcome::Processed(summary) => {
//!         println!("{} organizations, {} bad lines", summary.organizations.len(), summary.errors.len());
//!     }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::creator::Creator;
use super::reader::{ReadOutput, Reader};
use crate::api::logs::{log_info, log_warning};
use crate::config::{ImportOptions, RowErrorPolicy};
use crate::error::ImportResult;
use crate::models::{RowError, StoredOrganization};
use crate::parser::Source;
use crate::store::Store;

/// Result of an import that did not fail in storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ImportOutcome {
    /// The file could not be processed at all; nothing was written.
    Malformed(RowError),
    /// Rows were read; see [`ImportSummary::written`] for whether a write happened.
    Processed(ImportSummary),
}

/// Persisted records plus per-line errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub organizations: Vec<StoredOrganization>,
    pub errors: Vec<RowError>,
    pub written: bool,
}

impl ImportOutcome {
    /// Every per-line error, including the line-0 structural one.
    pub fn errors(&self) -> &[RowError] {
        match self {
            ImportOutcome::Malformed(error) => std::slice::from_ref(error),
            ImportOutcome::Processed(summary) => &summary.errors,
        }
    }
}

/// Collect a file without writing anything.
pub fn check(source: &Source, options: &ImportOptions, now: DateTime<Utc>) -> ImportResult<ReadOutput> {
    Reader::new(source, options, now).perform()
}

/// Import a file into the store.
///
/// Returns `Err` for I/O failures and for storage failures (in which case the
/// transaction has been rolled back).
pub fn import(
    source: &Source,
    store: &mut Store,
    options: &ImportOptions,
    now: DateTime<Utc>,
) -> ImportResult<ImportOutcome> {
    let mut output = check(source, options, now)?;

    if output.is_structural_failure() {
        let error = output.errors.remove(0);
        return Ok(ImportOutcome::Malformed(error));
    }

    let ReadOutput {
        organizations,
        addresses,
        errors,
    } = output;

    if !errors.is_empty() && options.row_errors == RowErrorPolicy::RejectAll {
        log_warning(format!(
            "{} invalid rows, nothing written (reject-all policy)",
            errors.len()
        ));
        return Ok(ImportOutcome::Processed(ImportSummary {
            organizations: Vec::new(),
            errors,
            written: false,
        }));
    }

    if organizations.is_empty() {
        log_info("No valid organizations, nothing to write");
        return Ok(ImportOutcome::Processed(ImportSummary {
            organizations: Vec::new(),
            errors,
            written: false,
        }));
    }

    let stored = Creator::new(&organizations, &addresses)
        .with_policy(options.conflict_policy)
        .perform(store)?;

    Ok(ImportOutcome::Processed(ImportSummary {
        organizations: stored,
        errors,
        written: true,
    }))
}
