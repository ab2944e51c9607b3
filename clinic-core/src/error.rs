use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy shared by every persistence-facing crate.
///
/// `IsolationViolation` and `ConcurrencyConflict` are raised to the immediate
/// caller and are never downgraded or silently retried by the persistence
/// layer itself.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    /// A read or write crossed the caller's authorized branch/tenant scope.
    /// The message carries identifiers only, never foreign field values.
    #[error("Isolation violation: actor {actor_id} is not authorized for {entity_type}/{entity_id}")]
    IsolationViolation {
        actor_id: Uuid,
        entity_type: &'static str,
        entity_id: String,
    },

    /// Row-version mismatch on a versioned entity at commit time. Recoverable:
    /// reload the current state and retry.
    #[error("Concurrency conflict on {entity_type}/{entity_id}: stored version differs from the loaded one")]
    ConcurrencyConflict {
        entity_type: &'static str,
        entity_id: String,
    },

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Operation cancelled before the commit was applied")]
    Cancelled,

    #[error("Entity type {0} is not registered in the capability registry")]
    UnregisteredEntity(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreError(anyhow::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::ConfigError(anyhow::Error::new(err))
    }
}

impl CoreError {
    /// Stable label for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::ValidationError(_) => "validation",
            CoreError::IsolationViolation { .. } => "isolation_violation",
            CoreError::ConcurrencyConflict { .. } => "concurrency_conflict",
            CoreError::NotFound(_) => "not_found",
            CoreError::Cancelled => "cancelled",
            CoreError::UnregisteredEntity(_) => "unregistered_entity",
            CoreError::Serialization(_) => "serialization",
            CoreError::StoreError(_) => "store",
            CoreError::ConfigError(_) => "config",
            CoreError::InternalError(_) => "internal",
        }
    }
}
