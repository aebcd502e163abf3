//! Error types for the collaborator layer.

use thiserror::Error;

/// Result type alias for collaborator operations.
pub type VoiceResult<T> = Result<T, VoiceError>;

/// Errors surfaced by embedding extraction and transcription backends.
///
/// Extraction failure is fatal to the current request; transcription failure
/// degrades only the liveness signal (the caller maps it, see the core's
/// decision engine).
#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
