use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use backbone_core::types::{Id, Platform};
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::db::assemble_contact;
use crate::error::{ContactError, Result};
use crate::types::{Contact, Resolution};

/// Maximum number of (platform, external_id) → contact_id pairs kept in the
/// in-process cache; simple evict-oldest-half policy, grounded on
/// `skynet-users/src/resolver.rs::UserResolver`'s cache.
const CACHE_MAX: usize = 256;

/// Platforms where an unresolved identity must be rejected rather than
/// silently onboarded (spec.md §4.5 step 1, §8 S6: "Discord DM from an
/// author id not registered in contacts" is rejected before any LLM/ledger
/// call). API traffic instead gets a placeholder contact so unauthenticated
/// flows still work.
fn requires_registration(platform: &Platform) -> bool {
    !matches!(platform, Platform::Api)
}

/// Identity resolver: translates external (platform, external_id) pairs
/// into first-class contacts. Grounded on `skynet-users/src/resolver.rs`,
/// generalized from skynet's rich User/role model down to spec.md §3's
/// leaner Contact{id, aliases, links} entity — this crate carries no
/// permission/budget/RBAC model, since Contact has no role field and
/// spec.md names none.
pub struct ContactStore {
    db: Arc<Mutex<Connection>>,
    /// Key: (platform, external_id), value: contact_id.
    cache: Mutex<HashMap<(Platform, String), Id>>,
    cache_order: Mutex<Vec<(Platform, String)>>,
}

impl ContactStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self {
            db,
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a (platform, external_id) pair per spec.md §4.5 step 1.
    ///
    /// Known pairs return `Resolution::Known`. Unknown pairs on `Platform::Api`
    /// are auto-created as a placeholder and returned as
    /// `Resolution::Placeholder`; unknown pairs on any other platform return
    /// `Resolution::Stranger` without touching the database beyond the
    /// lookup itself.
    pub fn resolve_or_reject(&self, platform: &Platform, external_id: &str) -> Result<Resolution> {
        let key = (platform.clone(), external_id.to_string());

        if let Some(contact_id) = self.cache_lookup(&key) {
            debug!(%platform, external_id, %contact_id, "contact cache hit");
            if let Some(contact) = self.get(&contact_id)? {
                return Ok(Resolution::Known(contact));
            }
            self.cache_remove(&key);
        }

        let conn = self.db.lock().unwrap();
        if let Some(contact) = find_by_link(&conn, platform, external_id)? {
            self.cache_insert(key, contact.id.clone());
            return Ok(Resolution::Known(contact));
        }
        drop(conn);

        if requires_registration(platform) {
            info!(%platform, external_id, "unregistered identity on a registration-required platform");
            return Ok(Resolution::Stranger);
        }

        info!(%platform, external_id, "unknown identity; creating placeholder contact");
        let display_name = format!("{}:{}", platform, external_id);
        let contact = self.create(&display_name, platform, external_id)?;
        self.cache_insert(key, contact.id.clone());
        Ok(Resolution::Placeholder(contact))
    }

    /// Create a brand-new contact with one seed alias and one link.
    pub fn create(&self, display_name: &str, platform: &Platform, external_id: &str) -> Result<Contact> {
        let conn = self.db.lock().unwrap();
        let id = Id::new();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO contacts (id, created_at, updated_at) VALUES (?1, ?2, ?3)",
            params![id.as_str(), now, now],
        )?;
        conn.execute(
            "INSERT INTO contact_aliases (contact_id, position, alias) VALUES (?1, 0, ?2)",
            params![id.as_str(), display_name],
        )?;
        conn.execute(
            "INSERT INTO contact_links (contact_id, platform, external_id) VALUES (?1, ?2, ?3)",
            params![id.as_str(), platform.to_string(), external_id],
        )?;
        Ok(Contact {
            id,
            aliases: vec![display_name.to_string()],
            links: vec![crate::types::ContactLink {
                platform: platform.clone(),
                external_id: external_id.to_string(),
            }],
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get(&self, contact_id: &Id) -> Result<Option<Contact>> {
        let conn = self.db.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, updated_at FROM contacts WHERE id = ?1",
        )?;
        let header = stmt
            .query_row(params![contact_id.as_str()], crate::db::row_to_contact_header);
        match header {
            Ok((id, created_at, updated_at)) => {
                Ok(Some(assemble_contact(&conn, id, created_at, updated_at)?))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(ContactError::DatabaseError(e)),
        }
    }

    /// Append a new alias to the end of the ordered list (never touches
    /// position 0, preserving the display-name invariant).
    pub fn add_alias(&self, contact_id: &Id, alias: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let next_position: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM contact_aliases WHERE contact_id = ?1",
            params![contact_id.as_str()],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT INTO contact_aliases (contact_id, position, alias) VALUES (?1, ?2, ?3)",
            params![contact_id.as_str(), next_position, alias],
        )?;
        conn.execute(
            "UPDATE contacts SET updated_at = ?2 WHERE id = ?1",
            params![contact_id.as_str(), Utc::now()],
        )?;
        Ok(())
    }

    /// Link an additional (platform, external_id) pair to an existing
    /// contact. Rejected if the pair is already claimed by another contact —
    /// the UNIQUE(platform, external_id) constraint is the source of truth.
    pub fn link(&self, contact_id: &Id, platform: &Platform, external_id: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO contact_links (contact_id, platform, external_id)
             VALUES (?1, ?2, ?3)",
            params![contact_id.as_str(), platform.to_string(), external_id],
        )?;
        if inserted == 0 {
            return Err(ContactError::AlreadyLinked);
        }
        drop(conn);
        self.invalidate(platform, external_id);
        Ok(())
    }

    fn cache_lookup(&self, key: &(Platform, String)) -> Option<Id> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn cache_remove(&self, key: &(Platform, String)) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        cache.remove(key);
        order.retain(|k| k != key);
    }

    fn cache_insert(&self, key: (Platform, String), contact_id: Id) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();

        if cache.contains_key(&key) {
            cache.insert(key, contact_id);
            return;
        }

        if cache.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            let to_remove: Vec<_> = order.drain(..evict_count).collect();
            for k in to_remove {
                cache.remove(&k);
            }
        }

        order.push(key.clone());
        cache.insert(key, contact_id);
    }

    fn invalidate(&self, platform: &Platform, external_id: &str) {
        self.cache_remove(&(platform.clone(), external_id.to_string()));
    }
}

fn find_by_link(conn: &Connection, platform: &Platform, external_id: &str) -> Result<Option<Contact>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.created_at, c.updated_at
         FROM contacts c
         JOIN contact_links l ON l.contact_id = c.id
         WHERE l.platform = ?1 AND l.external_id = ?2",
    )?;
    let header = stmt.query_row(
        params![platform.to_string(), external_id],
        crate::db::row_to_contact_header,
    );
    match header {
        Ok((id, created_at, updated_at)) => Ok(Some(assemble_contact(conn, id, created_at, updated_at)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(ContactError::DatabaseError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> ContactStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        ContactStore::new(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn api_platform_auto_creates_placeholder() {
        let store = test_store();
        let res = store.resolve_or_reject(&Platform::Api, "anon-1").unwrap();
        match res {
            Resolution::Placeholder(c) => assert_eq!(c.display_name(), "api:anon-1"),
            other => panic!("expected Placeholder, got {:?}", other),
        }
    }

    #[test]
    fn discord_platform_rejects_unknown_identity() {
        let store = test_store();
        let res = store
            .resolve_or_reject(&Platform::Discord, "99999")
            .unwrap();
        assert!(matches!(res, Resolution::Stranger));
    }

    #[test]
    fn known_identity_resolves_on_second_call() {
        let store = test_store();
        let first = store.resolve_or_reject(&Platform::Api, "anon-2").unwrap();
        let id = first.contact().unwrap().id.clone();

        let second = store.resolve_or_reject(&Platform::Api, "anon-2").unwrap();
        match second {
            Resolution::Known(c) => assert_eq!(c.id, id),
            other => panic!("expected Known, got {:?}", other),
        }
    }

    #[test]
    fn linking_an_already_claimed_pair_is_rejected() {
        let store = test_store();
        let a = store.create("Alice", &Platform::Discord, "111").unwrap();
        let _b = store.create("Bob", &Platform::Discord, "222").unwrap();

        let err = store.link(&a.id, &Platform::Discord, "222").unwrap_err();
        assert!(matches!(err, ContactError::AlreadyLinked));
    }

    #[test]
    fn added_alias_never_displaces_display_name() {
        let store = test_store();
        let c = store.create("Alice", &Platform::Discord, "111").unwrap();
        store.add_alias(&c.id, "Ally").unwrap();

        let reloaded = store.get(&c.id).unwrap().unwrap();
        assert_eq!(reloaded.display_name(), "Alice");
        assert_eq!(reloaded.aliases, vec!["Alice".to_string(), "Ally".to_string()]);
    }
}
