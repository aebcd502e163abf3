//! # Vocalis Voice — collaborator contracts for the authentication core
//!
//! The decision core treats audio processing, embedding extraction and
//! transcription as external collaborators with fixed contracts. This crate
//! holds those contracts plus placeholder and remote (OpenAI-compatible)
//! backends:
//!
//! ```text
//! preprocessed PCM ─┬→ EmbeddingExtractor ─→ probe embedding ─→ core verify
//!                   └→ pcm_f32_to_wav ─→ Transcriber ─→ text ─→ core liveness
//! ```
//!
//! Extraction failure is fatal to the request; transcription failure
//! degrades only the liveness signal. Remote backends call with bounded
//! 30-second timeouts and never retry — retry policy belongs to the caller.

pub mod audio;
pub mod error;
pub mod extractor;
pub mod transcriber;

pub use audio::{pcm_f32_to_wav, peak_normalize};
pub use error::{VoiceError, VoiceResult};
pub use extractor::{create_extractor, EmbeddingExtractor, PlaceholderExtractor, RemoteExtractor};
pub use transcriber::{
    create_transcriber, PlaceholderTranscriber, RemoteTranscriber, Transcriber,
};
