//! REST API types for the import endpoints.
//!
//! Organizations are returned as stored, with their ids, timestamps and addresses.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::BulkInsertError;
use crate::import::ImportSummary;
use crate::models::{RowError, StoredOrganization};

/// Response sent after a processed import.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    /// Unique job identifier
    pub job_id: String,

    /// Status: "ready" (all rows imported), "warning" (some rows rejected), "empty"
    pub status: String,

    /// Persisted organizations with their addresses
    pub organizations: Vec<StoredOrganization>,

    /// Per-line validation errors, in file order
    pub errors: Vec<RowError>,

    pub metadata: ImportMetadata,
}

/// Counts about the import
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportMetadata {
    pub organization_count: usize,
    pub address_count: usize,
    pub invalid_rows: usize,
    /// Whether the write transaction ran and committed
    pub written: bool,
}

impl From<ImportSummary> for ImportResponse {
    fn from(summary: ImportSummary) -> Self {
        let status = if !summary.written {
            "empty"
        } else if summary.errors.is_empty() {
            "ready"
        } else {
            "warning"
        };

        let address_count = summary
            .organizations
            .iter()
            .map(|o| o.addresses.len())
            .sum();

        ImportResponse {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            metadata: ImportMetadata {
                organization_count: summary.organizations.len(),
                address_count,
                invalid_rows: summary.errors.len(),
                written: summary.written,
            },
            organizations: summary.organizations,
            errors: summary.errors,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "organizations": [],
        "errors": [],
    })
}

/// Error response carrying the rejected rows
pub fn rejected_response(errors: &[RowError]) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "organizations": [],
        "errors": errors,
    })
}

/// Error response for a rolled-back write
pub fn bulk_insert_response(err: &BulkInsertError) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": err.to_string(),
        "failedRecords": err.failed_records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailedRecord, FailedRecords, RecordKind};
    use chrono::{TimeZone, Utc};

    fn organization() -> StoredOrganization {
        let now = Utc.with_ymd_and_hms(2024, 12, 20, 14, 39, 36).unwrap();
        StoredOrganization {
            id: 1,
            name: "Acme".into(),
            registration_number: "111".into(),
            created_at: now,
            updated_at: now,
            addresses: Vec::new(),
        }
    }

    #[test]
    fn test_status_from_summary() {
        let ready = ImportResponse::from(ImportSummary {
            organizations: vec![organization()],
            errors: Vec::new(),
            written: true,
        });
        assert_eq!(ready.status, "ready");
        assert_eq!(ready.metadata.organization_count, 1);

        let warning = ImportResponse::from(ImportSummary {
            organizations: vec![organization()],
            errors: vec![RowError::new(2, vec!["Name can't be blank".into()])],
            written: true,
        });
        assert_eq!(warning.status, "warning");
        assert_eq!(warning.metadata.invalid_rows, 1);

        let empty = ImportResponse::from(ImportSummary::default());
        assert_eq!(empty.status, "empty");
        assert!(!empty.metadata.written);
    }

    #[test]
    fn test_response_is_camel_case() {
        let response = ImportResponse::from(ImportSummary {
            organizations: vec![organization()],
            errors: Vec::new(),
            written: true,
        });
        let value = serde_json::to_value(&response).unwrap();

        assert!(value["jobId"].is_string());
        assert_eq!(value["organizations"][0]["registrationNumber"], "111");
        assert_eq!(value["metadata"]["organizationCount"], 1);
    }

    #[test]
    fn test_bulk_insert_response_lists_failed_records() {
        let mut failed = FailedRecords::default();
        failed.push(FailedRecord {
            kind: RecordKind::Organization,
            index: 0,
            registration_number: "111".into(),
            reason: "UNIQUE constraint failed: organizations.registration_number".into(),
        });

        let value = bulk_insert_response(&BulkInsertError::new(failed));

        assert_eq!(value["status"], "error");
        assert_eq!(value["failedRecords"]["organizations"][0]["registrationNumber"], "111");
    }

    #[test]
    fn test_rejected_response_keeps_lines() {
        let value = rejected_response(&[RowError::structural("Missing required headers: city")]);
        assert_eq!(value["errors"][0]["line"], 0);
        assert_eq!(
            value["errors"][0]["errors"][0],
            "Malformed CSV file: Missing required headers: city"
        );
    }
}
