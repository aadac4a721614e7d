//! Domain models for the Orgload import pipeline.
//!
//! This module contains the record types that flow through the pipeline:
//!
//! - [`ImportRow`] - Raw values of one CSV data line
//! - [`NewOrganization`] / [`NewAddress`] - Validated records, not yet persisted
//! - [`RowError`] - Validation failures for one line
//! - [`StoredOrganization`] / [`StoredAddress`] - Records as read back from storage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of an organization name, in characters.
pub const NAME_MAX_LENGTH: usize = 256;

// =============================================================================
// Import Row
// =============================================================================

/// Raw field values of one data line.
///
/// A field is `None` when the line has fewer cells than the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportRow {
    /// 1-based position among data lines.
    pub line: usize,
    pub name: Option<String>,
    pub registration_number: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

// =============================================================================
// Organization
// =============================================================================

/// An organization ready to be inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganization {
    pub name: String,
    pub registration_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewOrganization {
    /// Check the organization rules, returning every violation in field order.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if is_blank(&self.name) {
            errors.push("Name can't be blank".to_string());
        } else if self.name.chars().count() > NAME_MAX_LENGTH {
            errors.push(format!(
                "Name is too long (maximum is {} characters)",
                NAME_MAX_LENGTH
            ));
        }

        if is_blank(&self.registration_number) {
            errors.push("Registration number can't be blank".to_string());
        }

        errors
    }
}

// =============================================================================
// Address
// =============================================================================

/// An address ready to be inserted.
///
/// Linked to its organization by registration number; the storage id is
/// only known once the organization batch has been written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAddress {
    pub street: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub country: String,
    pub registration_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewAddress {
    /// Check the address rules. Postal code is unconstrained.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if is_blank(&self.street) {
            errors.push("Street can't be blank".to_string());
        }
        if is_blank(&self.city) {
            errors.push("City can't be blank".to_string());
        }
        if is_blank(&self.country) {
            errors.push("Country can't be blank".to_string());
        }

        errors
    }
}

// =============================================================================
// Row Error
// =============================================================================

/// Validation failures for one line. Line 0 marks a structural failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub line: usize,
    pub errors: Vec<String>,
}

impl RowError {
    pub fn new(line: usize, errors: Vec<String>) -> Self {
        Self { line, errors }
    }

    /// The single error reported when the file cannot be processed at all.
    pub fn structural(message: impl std::fmt::Display) -> Self {
        Self {
            line: 0,
            errors: vec![format!("Malformed CSV file: {}", message)],
        }
    }

    pub fn is_structural(&self) -> bool {
        self.line == 0
    }
}

// =============================================================================
// Stored Records
// =============================================================================

/// An organization read back from storage, with its addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredOrganization {
    pub id: i64,
    pub name: String,
    pub registration_number: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub addresses: Vec<StoredAddress>,
}

/// An address read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAddress {
    pub id: i64,
    pub organization_id: i64,
    pub street: String,
    pub city: String,
    pub postal_code: Option<String>,
    pub country: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}
