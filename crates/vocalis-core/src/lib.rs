//! # Vocalis Core — voice authentication decision core
//!
//! Turns a noisy similarity score and a noisy transcription into a
//! trustworthy accept/deny decision, backed by a spoken-sentence liveness
//! challenge that can be consumed at most once.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Decision Engine                          │
//! │  ┌────────────┐   ┌─────────────────┐   ┌────────────────┐  │
//! │  │ cosine     │   │ Challenge Engine │   │ granted =      │  │
//! │  │ scoring    │ + │ validate-once    │ → │ voice ∧ live   │  │
//! │  └────────────┘   └─────────────────┘   └────────────────┘  │
//! │         │                  │                     │           │
//! │         └───────────── Profile Store ────────────┘           │
//! │            (speakers / challenges / access logs)             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Audio decoding, embedding extraction and transcription are external
//! collaborators (see the `vocalis-voice` crate); every cross-call fact
//! flows through the [`store::ProfileStore`] handle — no ambient singletons.

pub mod challenge;
pub mod config;
pub mod decision;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod prompts;
pub mod store;
pub mod text;

pub use challenge::{ChallengeEngine, LivenessReason, LivenessVerdict};
pub use config::{
    AudioConfig, DatabaseConfig, EmbeddingConfig, LivenessConfig, VerificationConfig, VocalisConfig,
};
pub use decision::{DecisionEngine, IdentifyMatch, VerificationVerdict, VerifyOptions};
pub use error::{AuthError, AuthResult};
pub use fusion::TemplateFusion;
pub use prompts::{Complexity, PromptGenerator};
pub use store::{
    AccessLogEntry, Challenge, Decision, ProfileStore, SpeakerSummary, SpeakerTemplate,
};
