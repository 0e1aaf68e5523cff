//! Error taxonomy shared by the engine, the `skill` tool and the
//! skill-authoring store.

use thiserror::Error;

/// Errors surfaced to callers of the `skill` tool and the lifecycle store.
///
/// None of these are fatal: [`crate::tools::invoke`] renders every variant
/// into an error [`InvocationResult`](crate::tools::InvocationResult) and
/// leaves registry and session state untouched.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("unknown skill: {0}")]
    NotFound(String),
    #[error("invalid skill document: {0}")]
    ValidationFailed(String),
    #[error("skill '{0}' already exists; use the `update` action to change it")]
    AlreadyExists(String),
    #[error("skill authoring is disabled: no skills directory is configured")]
    Unconfigured,
    #[error("skill storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The document was written but the registry could not be reloaded.
    #[error("skill saved but the registry re-sync failed: {0}")]
    SyncFailed(String),
}

impl SkillError {
    /// Shorthand for a [`SkillError::ValidationFailed`] with a formatted reason.
    pub fn invalid(reason: impl Into<String>) -> Self {
        SkillError::ValidationFailed(reason.into())
    }
}
