use thiserror::Error;

/// Grounded on `skynet-users::error::UserError`: one thiserror enum per
/// crate, kept separate from `BackboneError` so callers can map it to
/// transport-specific responses without coupling layers.
#[derive(Debug, Error)]
pub enum ContactError {
    #[error("contact not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("(platform, external_id) pair already linked to another contact")]
    AlreadyLinked,
}

impl ContactError {
    pub fn code(&self) -> &'static str {
        match self {
            ContactError::NotFound(_) => "not_found",
            ContactError::DatabaseError(_) => "database_error",
            ContactError::AlreadyLinked => "already_linked",
        }
    }
}

pub type Result<T> = std::result::Result<T, ContactError>;
