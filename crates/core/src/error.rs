/// Error taxonomy for the coordination engine.
/// Every variant carries enough structure (kind + offending field) for the
/// API layer to render a precise message without string matching.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed for `{field}`: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("investigation {id} is archived")]
    InvestigationArchived { id: String },

    #[error("permission denied for {user_id}: {action}")]
    PermissionDenied {
        user_id: String,
        action: &'static str,
    },

    #[error("{entity} {id} was modified concurrently; re-read and retry")]
    ConcurrentModification { entity: &'static str, id: String },

    #[error("user {user_id} is already a collaborator on investigation {investigation_id}")]
    AlreadyMember {
        investigation_id: String,
        user_id: String,
    },

    #[error("user {user_id} is not a collaborator on investigation {investigation_id}")]
    NotAMember {
        investigation_id: String,
        user_id: String,
    },

    #[error("evidence hash mismatch: declared {declared}, computed {computed}")]
    IntegrityMismatch { declared: String, computed: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Wrap a transient store failure. Callers retry with backoff; the engine
    /// itself never treats these as fatal.
    pub fn store<E: std::fmt::Display>(err: E) -> Self {
        EngineError::StoreUnavailable {
            reason: err.to_string(),
        }
    }

    /// Stable snake_case label for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "validation_error",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::InvestigationArchived { .. } => "investigation_archived",
            EngineError::PermissionDenied { .. } => "permission_denied",
            EngineError::ConcurrentModification { .. } => "concurrent_modification",
            EngineError::AlreadyMember { .. } => "already_member",
            EngineError::NotAMember { .. } => "not_a_member",
            EngineError::IntegrityMismatch { .. } => "integrity_mismatch",
            EngineError::NotFound { .. } => "not_found",
            EngineError::StoreUnavailable { .. } => "store_unavailable",
        }
    }

    /// The offending field, when the error is about one.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            EngineError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
