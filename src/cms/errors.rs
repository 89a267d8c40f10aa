use sled::transaction::TransactionError;
use thiserror::Error;

/// Errors that can arise while reading or writing world content.
#[derive(Debug, Error)]
pub enum CmsError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around JSON errors (request arguments, condition parameters).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching or deleting a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Returned when creating a record whose caller-assigned key is taken.
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Returned when a write would leave a dangling or forbidden reference.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Input rejected before reaching storage (ranges, required fields).
    #[error("invalid input: {0}")]
    Validation(String),

    /// No usable identity accompanied the request.
    #[error("unauthenticated: {0}")]
    Unauthorized(String),

    /// The actor is known but lacks permission for the zone or operation.
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Internal error (task join errors, unexpected conditions)
    #[error("internal error: {0}")]
    Internal(String),
}

impl CmsError {
    /// Stable machine-readable code surfaced in API error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            CmsError::NotFound(_) => "NOT_FOUND",
            CmsError::AlreadyExists(_) => "ALREADY_EXISTS",
            CmsError::Constraint(_) => "CONSTRAINT",
            CmsError::Validation(_) | CmsError::Json(_) => "BAD_USER_INPUT",
            CmsError::Unauthorized(_) => "UNAUTHENTICATED",
            CmsError::Forbidden(_) => "FORBIDDEN",
            _ => "INTERNAL",
        }
    }

    /// True for errors whose message is safe to show callers verbatim.
    pub fn is_client_error(&self) -> bool {
        self.code() != "INTERNAL"
    }
}

impl From<TransactionError<CmsError>> for CmsError {
    fn from(err: TransactionError<CmsError>) -> Self {
        match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(e) => CmsError::Sled(e),
        }
    }
}
