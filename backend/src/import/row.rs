//! Row validation: one CSV line → an organization/address pair or a [`RowError`].

use chrono::{DateTime, Utc};

use super::headers::ColumnIndex;
use crate::models::{ImportRow, NewAddress, NewOrganization, RowError};

impl ImportRow {
    /// Pick the required cells out of a CSV record.
    pub fn from_record(line: usize, record: &csv::StringRecord, columns: &ColumnIndex) -> Self {
        let cell = |column: &str| columns.get(record, column).map(String::from);

        Self {
            line,
            name: cell("name"),
            registration_number: cell("registration_number"),
            street: cell("street"),
            city: cell("city"),
            postal_code: cell("postal_code"),
            country: cell("country"),
        }
    }
}

/// Result of validating one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Valid {
        organization: NewOrganization,
        address: NewAddress,
    },
    Invalid(RowError),
}

/// Validates a single [`ImportRow`], stamping records with the given clock value.
pub struct RowValidator<'a> {
    row: &'a ImportRow,
    now: DateTime<Utc>,
}

impl<'a> RowValidator<'a> {
    pub fn new(row: &'a ImportRow, now: DateTime<Utc>) -> Self {
        Self { row, now }
    }

    /// Apply every organization rule, then every address rule.
    pub fn validate(&self) -> RowOutcome {
        let organization = self.organization();
        let address = self.address();

        let mut errors = organization.validate();
        errors.extend(address.validate());

        if errors.is_empty() {
            RowOutcome::Valid {
                organization,
                address,
            }
        } else {
            RowOutcome::Invalid(RowError::new(self.row.line, errors))
        }
    }

    fn organization(&self) -> NewOrganization {
        NewOrganization {
            name: text(&self.row.name),
            registration_number: text(&self.row.registration_number),
            created_at: self.now,
            updated_at: self.now,
        }
    }

    fn address(&self) -> NewAddress {
        NewAddress {
            street: text(&self.row.street),
            city: text(&self.row.city),
            postal_code: Some(text(&self.row.postal_code)).filter(|p| !p.is_empty()),
            country: text(&self.row.country),
            registration_number: text(&self.row.registration_number),
            created_at: self.now,
            updated_at: self.now,
        }
    }
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}
