//! Error taxonomy for the authentication core.

use thiserror::Error;

/// Result type alias for core operations.
pub type AuthResult<T> = Result<T, AuthError>;

/// Errors surfaced by the profile store, fusion, challenge and decision layers.
///
/// None of these are retried inside the core; retry policy, if any, belongs
/// to the caller around the external collaborators.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Bad input shape. Rejected before any store mutation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Duplicate key on insert (e.g. enrolling an existing user).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown user or challenge id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The challenge was already consumed by an earlier validation attempt.
    #[error("challenge already used: {0}")]
    ChallengeUsed(String),

    /// The challenge outlived its time-to-live before being validated.
    #[error("challenge expired: {0}")]
    ChallengeExpired(String),

    /// Embedding extractor or transcriber unavailable.
    #[error("dependency unavailable: {0}")]
    Dependency(String),

    /// Stored and probe embeddings disagree on dimensionality.
    /// This is a configuration fault, never a decision input.
    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    /// True for the challenge-state violations that the decision engine
    /// folds into a liveness failure instead of propagating.
    pub fn is_liveness_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::NotFound(_) | AuthError::ChallengeUsed(_) | AuthError::ChallengeExpired(_)
        )
    }
}
