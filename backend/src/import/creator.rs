//! Bulk writer: inserts a collected batch in one transaction.
//!
//! Organizations go first, then addresses resolved through the
//! `registration_number → id` map built from the organization inserts.
//! Constraint violations are gathered for both batches; if any occurred the
//! transaction is rolled back and a [`BulkInsertError`] lists every rejected
//! record.

use rusqlite::{params, ErrorCode, Statement, Transaction};
use std::collections::HashMap;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::config::ConflictPolicy;
use crate::error::{BulkInsertError, FailedRecord, FailedRecords, ImportResult, RecordKind};
use crate::models::{NewAddress, NewOrganization, StoredOrganization};
use crate::store::{load_organizations, organization_id, Store};

const INSERT_ORGANIZATION_SKIP: &str = "
    INSERT INTO organizations (name, registration_number, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (registration_number) DO NOTHING
    RETURNING id";

const INSERT_ORGANIZATION_STRICT: &str = "
    INSERT INTO organizations (name, registration_number, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4)
    RETURNING id";

const INSERT_ADDRESS: &str = "
    INSERT INTO addresses (organization_id, street, city, postal_code, country, created_at, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Writes organizations and their addresses atomically.
pub struct Creator<'a> {
    organizations: &'a [NewOrganization],
    addresses: &'a [NewAddress],
    policy: ConflictPolicy,
}

/// Organization ids resolved during the write, in first-resolved order.
#[derive(Default)]
struct IdMap {
    by_registration_number: HashMap<String, i64>,
    ordered: Vec<i64>,
}

impl IdMap {
    /// Distinct registration numbers never share an id, so only new keys are recorded.
    fn insert(&mut self, registration_number: &str, id: i64) {
        if self
            .by_registration_number
            .insert(registration_number.to_string(), id)
            .is_none()
        {
            self.ordered.push(id);
        }
    }

    fn get(&self, registration_number: &str) -> Option<i64> {
        self.by_registration_number.get(registration_number).copied()
    }
}

impl<'a> Creator<'a> {
    pub fn new(organizations: &'a [NewOrganization], addresses: &'a [NewAddress]) -> Self {
        Self {
            organizations,
            addresses,
            policy: ConflictPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run the write. Returns the persisted organizations with their addresses.
    pub fn perform(&self, store: &mut Store) -> ImportResult<Vec<StoredOrganization>> {
        if self.organizations.is_empty() {
            return Ok(Vec::new());
        }

        log_info(format!(
            "💾 Writing {} organizations and {} addresses",
            self.organizations.len(),
            self.addresses.len()
        ));

        let tx = store.transaction()?;
        let mut failed = FailedRecords::default();

        let ids = self.insert_organizations(&tx, &mut failed)?;
        self.insert_addresses(&tx, &ids, &mut failed)?;

        if !failed.is_empty() {
            log_error(format!(
                "Rolled back: {} organizations and {} addresses rejected",
                failed.organizations.len(),
                failed.addresses.len()
            ));
            tx.rollback()?;
            return Err(BulkInsertError::new(failed).into());
        }

        let stored = load_organizations(&tx, &ids.ordered)?;
        tx.commit()?;

        log_success(format!("Committed {} organizations", stored.len()));
        Ok(stored)
    }

    fn insert_organizations(
        &self,
        tx: &Transaction<'_>,
        failed: &mut FailedRecords,
    ) -> ImportResult<IdMap> {
        let sql = match self.policy {
            ConflictPolicy::Skip => INSERT_ORGANIZATION_SKIP,
            ConflictPolicy::Reject => INSERT_ORGANIZATION_STRICT,
        };
        let mut stmt = tx.prepare(sql)?;
        let mut ids = IdMap::default();
        let mut skipped = 0usize;

        for (index, organization) in self.organizations.iter().enumerate() {
            match insert_organization(&mut stmt, organization) {
                Ok(Some(id)) => ids.insert(&organization.registration_number, id),
                // Conflict skipped: resolve to the row already stored.
                Ok(None) => {
                    skipped += 1;
                    if let Some(id) = organization_id(tx, &organization.registration_number)? {
                        ids.insert(&organization.registration_number, id);
                    }
                }
                Err(err) => match constraint_message(&err) {
                    Some(reason) => failed.push(FailedRecord {
                        kind: RecordKind::Organization,
                        index,
                        registration_number: organization.registration_number.clone(),
                        reason,
                    }),
                    None => return Err(err.into()),
                },
            }
        }

        if skipped > 0 {
            log_warning(format!(
                "{} organizations already exist, keeping stored rows",
                skipped
            ));
        }

        Ok(ids)
    }

    fn insert_addresses(
        &self,
        tx: &Transaction<'_>,
        ids: &IdMap,
        failed: &mut FailedRecords,
    ) -> ImportResult<()> {
        let mut stmt = tx.prepare(INSERT_ADDRESS)?;
        let mut dropped = 0usize;

        for (index, address) in self.addresses.iter().enumerate() {
            let Some(organization_id) = ids.get(&address.registration_number) else {
                dropped += 1;
                continue;
            };

            let result = stmt.execute(params![
                organization_id,
                address.street,
                address.city,
                address.postal_code,
                address.country,
                address.created_at,
                address.updated_at,
            ]);

            if let Err(err) = result {
                match constraint_message(&err) {
                    Some(reason) => failed.push(FailedRecord {
                        kind: RecordKind::Address,
                        index,
                        registration_number: address.registration_number.clone(),
                        reason,
                    }),
                    None => return Err(err.into()),
                }
            }
        }

        if dropped > 0 {
            log_warning(format!(
                "{} addresses dropped (no matching organization)",
                dropped
            ));
        }

        Ok(())
    }
}

/// Insert one organization; `Ok(None)` means the insert was skipped on conflict.
fn insert_organization(
    stmt: &mut Statement<'_>,
    organization: &NewOrganization,
) -> rusqlite::Result<Option<i64>> {
    let mut rows = stmt.query(params![
        organization.name,
        organization.registration_number,
        organization.created_at,
        organization.updated_at,
    ])?;

    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Storage message for per-record constraint violations; `None` for anything else.
fn constraint_message(err: &rusqlite::Error) -> Option<String> {
    match err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            Some(msg.clone().unwrap_or_else(|| e.to_string()))
        }
        _ => None,
    }
}
