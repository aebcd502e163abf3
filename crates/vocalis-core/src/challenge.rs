//! Liveness challenge engine: issue, bind, validate-once, expire.
//!
//! State machine: ISSUED -> USED (terminal) or -> EXPIRED (terminal). The
//! used flag flips on the first validation attempt, pass or fail, atomically
//! with the read that produced the verdict, so a replayed recording can
//! never answer the same challenge twice.

use crate::config::LivenessConfig;
use crate::error::{AuthError, AuthResult};
use crate::prompts::{Complexity, PromptGenerator};
use crate::store::{now_ms, Challenge, ProfileStore};
use crate::text;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Similarity floor below which a transcription is treated as unrelated
/// content (likely wrong person or a malfunctioning client) rather than a
/// near miss.
const UNRELATED_FLOOR: f32 = 0.3;

/// Why a liveness check passed or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessReason {
    Passed,
    /// Similarity close but under the threshold.
    BelowThreshold,
    /// Similarity near zero; the transcription does not resemble the prompt.
    UnrelatedContent,
    ChallengeNotFound,
    ChallengeUsed,
    ChallengeExpired,
    /// The transcriber was unavailable; the liveness signal degrades to fail.
    TranscriptionUnavailable,
}

impl LivenessReason {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Passed => "sentence matched the challenge prompt",
            Self::BelowThreshold => "sentence similarity below threshold",
            Self::UnrelatedContent => "transcribed text does not match the expected sentence",
            Self::ChallengeNotFound => "challenge not found",
            Self::ChallengeUsed => "challenge has already been used",
            Self::ChallengeExpired => "challenge has expired",
            Self::TranscriptionUnavailable => "transcription unavailable",
        }
    }
}

/// Structured outcome of one liveness validation.
#[derive(Debug, Clone, Serialize)]
pub struct LivenessVerdict {
    pub passed: bool,
    pub challenge_id: String,
    /// Empty when the challenge itself could not be loaded.
    pub expected_prompt: String,
    pub transcribed_text: String,
    pub similarity: f32,
    pub threshold: f32,
    pub reason: LivenessReason,
}

impl LivenessVerdict {
    /// Verdict for a challenge that failed before any similarity was
    /// computed (unknown, consumed, expired, or no transcription).
    pub fn rejected(
        challenge_id: &str,
        transcribed_text: &str,
        threshold: f32,
        reason: LivenessReason,
    ) -> Self {
        Self {
            passed: false,
            challenge_id: challenge_id.to_string(),
            expected_prompt: String::new(),
            transcribed_text: transcribed_text.to_string(),
            similarity: 0.0,
            threshold,
            reason,
        }
    }
}

/// Issues and validates single-use, time-bound challenges through the store.
#[derive(Clone)]
pub struct ChallengeEngine {
    store: Arc<ProfileStore>,
    ttl_secs: i64,
    match_threshold: f32,
    default_complexity: Complexity,
}

impl ChallengeEngine {
    pub fn new(store: Arc<ProfileStore>, cfg: &LivenessConfig) -> Self {
        Self {
            store,
            ttl_secs: cfg.challenge_ttl_secs,
            match_threshold: cfg.match_threshold,
            default_complexity: cfg.sentence_complexity,
        }
    }

    pub fn match_threshold(&self) -> f32 {
        self.match_threshold
    }

    /// Issue a fresh challenge, optionally bound to a user. Unbound
    /// challenges serve identification flows.
    pub fn issue(
        &self,
        user_id: Option<&str>,
        complexity: Option<Complexity>,
    ) -> AuthResult<Challenge> {
        let generator = PromptGenerator::new(complexity.unwrap_or(self.default_complexity));
        let prompt_text = generator.render(&mut rand::thread_rng());
        let challenge = self.persist(user_id, prompt_text)?;
        info!(
            challenge_id = %challenge.challenge_id,
            user_id = challenge.user_id.as_deref().unwrap_or("-"),
            "issued liveness challenge"
        );
        Ok(challenge)
    }

    /// Issue several challenges at once. Rendered sentences never repeat
    /// within the batch.
    pub fn issue_batch(
        &self,
        count: usize,
        user_id: Option<&str>,
        complexity: Option<Complexity>,
    ) -> AuthResult<Vec<Challenge>> {
        let generator = PromptGenerator::new(complexity.unwrap_or(self.default_complexity));
        let prompts = generator.render_batch(count, &mut rand::thread_rng());
        let mut out = Vec::with_capacity(prompts.len());
        for prompt_text in prompts {
            out.push(self.persist(user_id, prompt_text)?);
        }
        Ok(out)
    }

    fn persist(&self, user_id: Option<&str>, prompt_text: String) -> AuthResult<Challenge> {
        let created = now_ms();
        let challenge = Challenge {
            challenge_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.map(String::from),
            prompt_text,
            created_at_ms: created,
            expires_at_ms: created + self.ttl_secs * 1_000,
            used: false,
        };
        self.store.insert_challenge(&challenge)?;
        Ok(challenge)
    }

    /// Look up a challenge without consuming it.
    pub fn get(&self, challenge_id: &str) -> AuthResult<Option<Challenge>> {
        self.store.get_challenge(challenge_id)
    }

    /// Validate a transcription against a challenge. Check order: unknown id,
    /// already used, expired, then similarity. The challenge is consumed by
    /// this call whatever the similarity outcome; only the expired path
    /// leaves the used flag untouched.
    pub fn validate(&self, challenge_id: &str, transcribed_text: &str) -> AuthResult<LivenessVerdict> {
        let challenge = self.store.consume_challenge(challenge_id, now_ms())?;

        let similarity = text::token_sort_ratio(&challenge.prompt_text, transcribed_text);
        let passed = similarity >= self.match_threshold;
        let reason = if passed {
            LivenessReason::Passed
        } else if similarity < UNRELATED_FLOOR {
            LivenessReason::UnrelatedContent
        } else {
            LivenessReason::BelowThreshold
        };

        if passed {
            info!(challenge_id, similarity, "liveness challenge passed");
        } else {
            warn!(
                challenge_id,
                similarity,
                reason = reason.describe(),
                "liveness challenge failed"
            );
        }

        Ok(LivenessVerdict {
            passed,
            challenge_id: challenge.challenge_id,
            expected_prompt: challenge.prompt_text,
            transcribed_text: transcribed_text.to_string(),
            similarity,
            threshold: self.match_threshold,
            reason,
        })
    }

    /// Drop consumed and expired challenges. Callers may run this on a timer
    /// or opportunistically; correctness never depends on it.
    pub fn purge_stale(&self) -> AuthResult<usize> {
        self.store.purge_stale_challenges(now_ms())
    }
}
