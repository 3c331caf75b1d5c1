//! Error taxonomy shared by the engine, the admin operations and the API.

use crate::runtime::RuntimeError;
use crate::storage::StorageError;

pub type Result<T> = std::result::Result<T, ControlError>;

#[derive(thiserror::Error, Debug)]
pub enum ControlError {
    /// Missing or malformed input. Never mutates state.
    #[error("{0}")]
    Validation(String),

    /// Unknown user, wrong password or wrong API key.
    #[error("{0}")]
    Authentication(String),

    /// Authenticated, but not permitted for this target.
    #[error("{0}")]
    Authorization(String),

    /// Unknown container/group/user id, or unknown runtime identifier.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness or admin-count invariant would be violated.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Runtime(RuntimeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("password hashing failed: {0}")]
    Credential(String),
}

impl From<RuntimeError> for ControlError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::NotFound(_) => ControlError::NotFound(e.to_string()),
            other => ControlError::Runtime(other),
        }
    }
}

impl ControlError {
    pub fn missing_parameters() -> Self {
        ControlError::Validation("Missing parameters".into())
    }

    pub fn invalid_credentials() -> Self {
        ControlError::Authentication("Invalid credentials or API key".into())
    }

    pub fn admin_only() -> Self {
        ControlError::Authorization("Access denied.".into())
    }

    /// Short machine-readable category, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlError::Validation(_) => "validation",
            ControlError::Authentication(_) => "authentication",
            ControlError::Authorization(_) => "authorization",
            ControlError::NotFound(_) => "not_found",
            ControlError::Conflict(_) => "conflict",
            ControlError::Runtime(_) => "runtime",
            ControlError::Storage(_) => "storage",
            ControlError::Credential(_) => "credential",
        }
    }
}
