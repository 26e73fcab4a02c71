use thiserror::Error;

/// Top-level error taxonomy shared across crates (spec.md §7).
#[derive(Debug, Error)]
pub enum BackboneError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("connection error: {0}")]
    Connect(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("queue is full")]
    QueueFull,

    #[error("contact not found for platform {platform}, external id {external_id}")]
    UnknownContact { platform: String, external_id: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BackboneError {
    /// Short error code, used for HTTP status mapping and logs (spec.md §7
    /// taxonomy: input -> 4xx, upstream -> 502, timeout -> 504).
    pub fn code(&self) -> &'static str {
        match self {
            BackboneError::Config(_) => "CONFIG_ERROR",
            BackboneError::Input(_) => "INPUT_ERROR",
            BackboneError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            BackboneError::Upstream { .. } => "UPSTREAM_ERROR",
            BackboneError::Connect(_) => "CONNECT_ERROR",
            BackboneError::Decode(_) => "DECODE_ERROR",
            BackboneError::Timeout { .. } => "TIMEOUT",
            BackboneError::QueueFull => "QUEUE_FULL",
            BackboneError::UnknownContact { .. } => "UNKNOWN_CONTACT",
            BackboneError::Database(_) => "DATABASE_ERROR",
            BackboneError::Serialization(_) => "SERIALIZATION_ERROR",
            BackboneError::Io(_) => "IO_ERROR",
            BackboneError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this error should surface as (spec.md §7 propagation policy).
    pub fn http_status(&self) -> u16 {
        match self {
            BackboneError::Input(_) | BackboneError::UnknownProvider(_) => 400,
            BackboneError::UnknownContact { .. } => 404,
            BackboneError::Upstream { .. } | BackboneError::Connect(_) | BackboneError::Decode(_) => 502,
            BackboneError::Timeout { .. } => 504,
            BackboneError::QueueFull => 503,
            _ => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackboneError>;
