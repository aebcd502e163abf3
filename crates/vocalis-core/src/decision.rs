//! Verification and identification decision engine.
//!
//! Combines a voice-match score with the liveness gate into a single
//! accept/deny verdict and appends exactly one audit row per reached
//! decision. A stolen recording that matches the voiceprint but cannot
//! answer the live challenge is denied: the final decision is the
//! conjunction of both signals.

use crate::challenge::{ChallengeEngine, LivenessReason, LivenessVerdict};
use crate::config::{LivenessConfig, VerificationConfig};
use crate::embedding;
use crate::error::{AuthError, AuthResult};
use crate::store::{Decision, ProfileStore};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-request overrides. Fields left `None` resolve to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub threshold: Option<f32>,
    pub challenge_id: Option<String>,
    /// Transcription of the spoken challenge response. `None` with a
    /// challenge present means the transcriber failed or was skipped; the
    /// liveness signal degrades to fail.
    pub transcription: Option<String>,
}

/// Structured outcome of one verification attempt.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationVerdict {
    pub user_id: String,
    pub decision: Decision,
    pub score: f32,
    pub threshold: f32,
    pub voice_pass: bool,
    pub liveness_pass: bool,
    /// Present when a challenge was exercised (or failed to load).
    pub liveness: Option<LivenessVerdict>,
}

impl VerificationVerdict {
    pub fn granted(&self) -> bool {
        self.decision == Decision::Granted
    }
}

/// One ranked identification candidate.
#[derive(Debug, Clone, Serialize)]
pub struct IdentifyMatch {
    pub user_id: String,
    pub display_name: String,
    pub score: f32,
}

/// Scores probes against stored templates and renders final verdicts.
#[derive(Clone)]
pub struct DecisionEngine {
    store: Arc<ProfileStore>,
    challenges: ChallengeEngine,
    threshold: f32,
    liveness_enabled: bool,
}

impl DecisionEngine {
    pub fn new(
        store: Arc<ProfileStore>,
        challenges: ChallengeEngine,
        verification: &VerificationConfig,
        liveness: &LivenessConfig,
    ) -> Self {
        Self {
            store,
            challenges,
            threshold: verification.similarity_threshold,
            liveness_enabled: liveness.enabled,
        }
    }

    pub fn challenges(&self) -> &ChallengeEngine {
        &self.challenges
    }

    /// 1:1 verification of a probe against a claimed identity.
    ///
    /// Liveness-layer state violations (unknown, used, expired challenge)
    /// are captured as a failed liveness signal with the reason recorded,
    /// never propagated: voice scoring still completes and the attempt is
    /// still audit-logged. Exactly one audit row is appended per reached
    /// decision, granted or denied.
    pub fn verify(
        &self,
        probe: &[f32],
        claimed_user_id: &str,
        opts: VerifyOptions,
    ) -> AuthResult<VerificationVerdict> {
        let template = self
            .store
            .get_speaker(claimed_user_id)?
            .ok_or_else(|| AuthError::NotFound(format!("user '{claimed_user_id}' not found")))?;
        let threshold = opts.threshold.unwrap_or(self.threshold);

        let score = embedding::cosine_similarity(probe, &template.embedding)?;
        let voice_pass = score >= threshold;

        // Liveness defaults to pass-through true when disabled or when no
        // challenge was supplied.
        let (liveness_pass, liveness) = match (&opts.challenge_id, self.liveness_enabled) {
            (None, _) | (Some(_), false) => (true, None),
            (Some(challenge_id), true) => match &opts.transcription {
                None => {
                    let verdict = LivenessVerdict::rejected(
                        challenge_id,
                        "",
                        self.challenges.match_threshold(),
                        LivenessReason::TranscriptionUnavailable,
                    );
                    (false, Some(verdict))
                }
                Some(text) => match self.challenges.validate(challenge_id, text) {
                    Ok(verdict) => (verdict.passed, Some(verdict)),
                    Err(err) if err.is_liveness_rejection() => {
                        let reason = liveness_reason_for(&err);
                        warn!(
                            challenge_id = %challenge_id,
                            error = %err,
                            "liveness layer rejected challenge; treating as failed liveness"
                        );
                        let verdict = LivenessVerdict::rejected(
                            challenge_id,
                            text,
                            self.challenges.match_threshold(),
                            reason,
                        );
                        (false, Some(verdict))
                    }
                    Err(err) => return Err(err),
                },
            },
        };

        let decision = if voice_pass && liveness_pass {
            Decision::Granted
        } else {
            Decision::Denied
        };

        self.store.append_log(
            claimed_user_id,
            decision,
            score,
            threshold,
            liveness.as_ref().map(|l| l.challenge_id.as_str()),
            liveness.as_ref().map(|l| l.transcribed_text.as_str()),
            liveness.as_ref().map(|l| l.passed),
            liveness.as_ref().map(|_| liveness_pass),
        )?;

        info!(
            user_id = claimed_user_id,
            score,
            threshold,
            voice_pass,
            liveness_pass,
            decision = %decision,
            "verification decision"
        );

        Ok(VerificationVerdict {
            user_id: claimed_user_id.to_string(),
            decision,
            score,
            threshold,
            voice_pass,
            liveness_pass,
            liveness,
        })
    }

    /// 1:N identification: score the probe against every stored template,
    /// keep matches at or above the threshold, rank descending with ties in
    /// enrollment order, truncate to `top_n`. An empty result is not an
    /// error.
    pub fn identify(
        &self,
        probe: &[f32],
        threshold: Option<f32>,
        top_n: usize,
    ) -> AuthResult<Vec<IdentifyMatch>> {
        let threshold = threshold.unwrap_or(self.threshold);
        let templates = self.store.list_templates()?;

        let mut matches = Vec::new();
        for template in &templates {
            let score = embedding::cosine_similarity(probe, &template.embedding)?;
            if score >= threshold {
                matches.push(IdentifyMatch {
                    user_id: template.user_id.clone(),
                    display_name: template.display_name.clone(),
                    score,
                });
            }
        }
        // Stable sort keeps enrollment order on equal scores.
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        matches.truncate(top_n);

        info!(
            candidates = templates.len(),
            matched = matches.len(),
            threshold,
            "identification ranked"
        );
        Ok(matches)
    }
}

fn liveness_reason_for(err: &AuthError) -> LivenessReason {
    match err {
        AuthError::ChallengeUsed(_) => LivenessReason::ChallengeUsed,
        AuthError::ChallengeExpired(_) => LivenessReason::ChallengeExpired,
        _ => LivenessReason::ChallengeNotFound,
    }
}
