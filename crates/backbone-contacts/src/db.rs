use backbone_core::types::{Id, Platform};
use rusqlite::{Connection, Result, Row};
use std::str::FromStr;

use crate::types::{Contact, ContactLink};

/// Initialise the contacts schema. Safe to call on every startup, grounded
/// on `skynet-users/src/db.rs::init_db`'s idempotent `CREATE TABLE IF NOT
/// EXISTS` pattern.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL;")?;
    create_contacts_table(conn)?;
    create_aliases_table(conn)?;
    create_links_table(conn)?;
    Ok(())
}

fn create_contacts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS contacts (
            id          TEXT PRIMARY KEY,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );",
    )
}

/// Ordered aliases live in their own table (rather than a JSON blob column)
/// so `position` can enforce "first alias is the display name" with a plain
/// `ORDER BY` instead of application-level JSON parsing on every read.
fn create_aliases_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS contact_aliases (
            contact_id  TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL,
            alias       TEXT NOT NULL,
            PRIMARY KEY (contact_id, position)
        );",
    )
}

/// UNIQUE(platform, external_id) is the DB-level enforcement of spec.md §3's
/// Contact invariant: "each (platform, external_id) pair maps to at most one
/// contact."
fn create_links_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS contact_links (
            contact_id   TEXT NOT NULL REFERENCES contacts(id) ON DELETE CASCADE,
            platform     TEXT NOT NULL,
            external_id  TEXT NOT NULL,
            UNIQUE(platform, external_id)
        );
        CREATE INDEX IF NOT EXISTS idx_links_lookup
            ON contact_links(platform, external_id);",
    )
}

pub(crate) fn load_aliases(conn: &Connection, contact_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT alias FROM contact_aliases WHERE contact_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt
        .query_map([contact_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn load_links(conn: &Connection, contact_id: &str) -> Result<Vec<ContactLink>> {
    let mut stmt = conn.prepare(
        "SELECT platform, external_id FROM contact_links WHERE contact_id = ?1",
    )?;
    let rows = stmt
        .query_map([contact_id], |row| {
            let platform: String = row.get(0)?;
            let external_id: String = row.get(1)?;
            Ok(ContactLink {
                platform: Platform::from_str(&platform).unwrap(),
                external_id,
            })
        })?
        .collect::<Result<Vec<_>>>()?;
    Ok(rows)
}

pub(crate) fn row_to_contact_header(row: &Row<'_>) -> Result<(Id, chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)> {
    Ok((
        Id::from(row.get::<_, String>(0)?),
        row.get(1)?,
        row.get(2)?,
    ))
}

pub(crate) fn assemble_contact(conn: &Connection, id: Id, created_at: chrono::DateTime<chrono::Utc>, updated_at: chrono::DateTime<chrono::Utc>) -> Result<Contact> {
    let aliases = load_aliases(conn, id.as_str())?;
    let links = load_links(conn, id.as_str())?;
    Ok(Contact {
        id,
        aliases,
        links,
        created_at,
        updated_at,
    })
}
