//! SQLite storage for organizations and addresses.
//!
//! The schema mirrors the domain rules as constraints so that the database is
//! the final authority: name length, non-empty fields, unique registration
//! numbers and address → organization foreign keys.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;

use crate::error::StoreResult;
use crate::models::{StoredAddress, StoredOrganization};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS organizations (
    id                  INTEGER PRIMARY KEY,
    name                TEXT NOT NULL CHECK (length(name) BETWEEN 1 AND 256),
    registration_number TEXT NOT NULL UNIQUE CHECK (registration_number <> ''),
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS addresses (
    id              INTEGER PRIMARY KEY,
    organization_id INTEGER NOT NULL REFERENCES organizations(id) ON DELETE CASCADE,
    street          TEXT NOT NULL CHECK (street <> ''),
    city            TEXT NOT NULL CHECK (city <> ''),
    postal_code     TEXT,
    country         TEXT NOT NULL CHECK (country <> ''),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS index_addresses_on_organization_id
    ON addresses (organization_id);
"#;

/// Joined organization/address rows; filtered variants append a WHERE clause.
const SELECT_WITH_ADDRESSES: &str = "
    SELECT o.id, o.name, o.registration_number, o.created_at, o.updated_at,
           a.id, a.street, a.city, a.postal_code, a.country, a.created_at, a.updated_at
      FROM organizations o
      LEFT JOIN addresses a ON a.organization_id = o.id";

const ORDER_WITH_ADDRESSES: &str = " ORDER BY o.id, a.id";

/// Handle on the import database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) a database file and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Apply the schema; idempotent.
    pub fn migrate(&self) -> StoreResult<()> {
        self.conn.execute_batch(SCHEMA)
    }

    /// Start the transaction an import writes in.
    pub fn transaction(&mut self) -> StoreResult<Transaction<'_>> {
        self.conn.transaction()
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn organization_count(&self) -> StoreResult<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM organizations")
    }

    pub fn address_count(&self) -> StoreResult<usize> {
        count(&self.conn, "SELECT COUNT(*) FROM addresses")
    }

    /// Every organization with its addresses, ordered by id.
    pub fn list_organizations(&self) -> StoreResult<Vec<StoredOrganization>> {
        let sql = format!("{}{}", SELECT_WITH_ADDRESSES, ORDER_WITH_ADDRESSES);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query([])?;
        collect_organizations(rows)
    }

    pub fn find_by_registration_number(
        &self,
        registration_number: &str,
    ) -> StoreResult<Option<StoredOrganization>> {
        let sql = format!(
            "{} WHERE o.registration_number = ?1{}",
            SELECT_WITH_ADDRESSES, ORDER_WITH_ADDRESSES
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query(params![registration_number])?;
        Ok(collect_organizations(rows)?.into_iter().next())
    }
}

/// Load the given organizations with their addresses in one query.
///
/// Ids travel as a single JSON array parameter, so the statement does not
/// depend on the batch size.
pub fn load_organizations(conn: &Connection, ids: &[i64]) -> StoreResult<Vec<StoredOrganization>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let ids_json = serde_json::to_string(ids)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

    let sql = format!(
        "{} WHERE o.id IN (SELECT value FROM json_each(?1)){}",
        SELECT_WITH_ADDRESSES, ORDER_WITH_ADDRESSES
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query(params![ids_json])?;
    collect_organizations(rows)
}

/// Id of a stored organization by natural key.
pub fn organization_id(conn: &Connection, registration_number: &str) -> StoreResult<Option<i64>> {
    conn.query_row(
        "SELECT id FROM organizations WHERE registration_number = ?1",
        params![registration_number],
        |row| row.get(0),
    )
    .optional()
}

fn count(conn: &Connection, sql: &str) -> StoreResult<usize> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as usize)
}

/// Fold joined rows (ordered by organization id) into nested records.
fn collect_organizations(mut rows: rusqlite::Rows<'_>) -> StoreResult<Vec<StoredOrganization>> {
    let mut organizations: Vec<StoredOrganization> = Vec::new();

    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;

        let is_new = organizations.last().map_or(true, |o| o.id != id);
        if is_new {
            organizations.push(StoredOrganization {
                id,
                name: row.get(1)?,
                registration_number: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
                addresses: Vec::new(),
            });
        }

        if let Some(address) = address_from_row(id, row)? {
            if let Some(organization) = organizations.last_mut() {
                organization.addresses.push(address);
            }
        }
    }

    Ok(organizations)
}

fn address_from_row(organization_id: i64, row: &Row<'_>) -> StoreResult<Option<StoredAddress>> {
    let id: Option<i64> = row.get(5)?;
    let Some(id) = id else {
        return Ok(None);
    };

    Ok(Some(StoredAddress {
        id,
        organization_id,
        street: row.get(6)?,
        city: row.get(7)?,
        postal_code: row.get(8)?,
        country: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    }))
}
