use backbone_core::types::{Id, Platform};
use serde::{Deserialize, Serialize};

/// One external channel identity linked to a contact (spec.md §3 Contact
/// entity: "a set of `(platform, external_id)` pairs").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactLink {
    pub platform: Platform,
    pub external_id: String,
}

/// An identity resolved across channels. Fields per spec.md §3: `id`,
/// `aliases` (ordered; first is the display name), and the linked
/// `(platform, external_id)` set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Id,
    pub aliases: Vec<String>,
    pub links: Vec<ContactLink>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Contact {
    /// First alias is the display name by invariant; falls back to the id
    /// when a contact somehow has no alias yet (should not happen in
    /// practice — every creation path seeds at least one).
    pub fn display_name(&self) -> &str {
        self.aliases.first().map(|s| s.as_str()).unwrap_or(self.id.as_str())
    }
}

/// Outcome of resolving a (platform, external_id) pair, per SPEC_FULL.md's
/// admin-gate/stranger-handling supplement to spec.md §4.5 step 1.
#[derive(Debug)]
pub enum Resolution {
    /// The pair was already linked to a contact.
    Known(Contact),
    /// Unknown pair, auto-created as a placeholder contact (API/unauthenticated
    /// flows — spec.md §4.5 step 1's first branch).
    Placeholder(Contact),
    /// Unknown pair on a platform that requires a registered contact
    /// (messaging platforms — spec.md §4.5 step 1's second branch / §8 S6).
    Stranger,
}

impl Resolution {
    pub fn contact(&self) -> Option<&Contact> {
        match self {
            Resolution::Known(c) | Resolution::Placeholder(c) => Some(c),
            Resolution::Stranger => None,
        }
    }
}
