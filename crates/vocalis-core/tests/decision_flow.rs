//! Integration test: end-to-end verification and identification flows.
//!
//! Exercises the decision conjunction (voice AND liveness), audit logging,
//! liveness degradation on challenge-state violations, and 1:N ranking.

use std::sync::Arc;
use vocalis_core::{
    AuthError, ChallengeEngine, Decision, DecisionEngine, LivenessConfig, LivenessReason,
    ProfileStore, TemplateFusion, VerificationConfig, VerifyOptions,
};

const DIM: usize = 8;

struct Harness {
    store: Arc<ProfileStore>,
    fusion: TemplateFusion,
    engine: DecisionEngine,
}

fn harness(dir: &std::path::Path) -> Harness {
    let store = Arc::new(ProfileStore::open(dir.join("vocalis.db"), DIM).unwrap());
    let verification = VerificationConfig::default();
    let liveness = LivenessConfig::default();
    let challenges = ChallengeEngine::new(store.clone(), &liveness);
    let engine = DecisionEngine::new(store.clone(), challenges, &verification, &liveness);
    let fusion = TemplateFusion::new(store.clone(), &verification);
    Harness {
        store,
        fusion,
        engine,
    }
}

fn axis_vec(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; DIM];
    v[axis] = 1.0;
    v
}

fn enroll_on_axis(h: &Harness, user_id: &str, name: &str, axis: usize) {
    let samples = vec![axis_vec(axis), axis_vec(axis), axis_vec(axis)];
    h.fusion.enroll(user_id, name, &samples).unwrap();
}

#[test]
fn verify_without_challenge_grants_on_score() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    let verdict = h
        .engine
        .verify(&axis_vec(0), "alice", VerifyOptions::default())
        .unwrap();
    assert!(verdict.granted());
    assert!(verdict.voice_pass);
    assert!(verdict.liveness_pass);
    assert!(verdict.liveness.is_none());
    assert!((verdict.score - 1.0).abs() < 1e-6);
}

#[test]
fn verify_denies_below_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    // Orthogonal probe scores ~0, well under the 0.7 default.
    let verdict = h
        .engine
        .verify(&axis_vec(1), "alice", VerifyOptions::default())
        .unwrap();
    assert!(!verdict.granted());
    assert!(!verdict.voice_pass);
    assert_eq!(verdict.decision, Decision::Denied);
}

#[test]
fn verify_unknown_user_is_not_found_and_unlogged() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    let err = h
        .engine
        .verify(&axis_vec(0), "ghost", VerifyOptions::default())
        .unwrap_err();
    assert!(matches!(err, AuthError::NotFound(_)));
    assert!(h.store.access_logs(None, 10).unwrap().is_empty());
}

#[test]
fn matching_voice_with_failed_challenge_is_denied() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    let challenge = h.engine.challenges().issue(Some("alice"), None).unwrap();
    let verdict = h
        .engine
        .verify(
            &axis_vec(0),
            "alice",
            VerifyOptions {
                challenge_id: Some(challenge.challenge_id.clone()),
                transcription: Some("something entirely different".into()),
                ..Default::default()
            },
        )
        .unwrap();

    // Replay defense: perfect voiceprint, wrong sentence, denied.
    assert!(verdict.voice_pass);
    assert!(!verdict.liveness_pass);
    assert!(!verdict.granted());
    let liveness = verdict.liveness.unwrap();
    assert!(!liveness.passed);
}

#[test]
fn matching_voice_with_passed_challenge_is_granted() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    let challenge = h.engine.challenges().issue(Some("alice"), None).unwrap();
    let verdict = h
        .engine
        .verify(
            &axis_vec(0),
            "alice",
            VerifyOptions {
                challenge_id: Some(challenge.challenge_id.clone()),
                transcription: Some(challenge.prompt_text.clone()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(verdict.granted());
    let liveness = verdict.liveness.unwrap();
    assert!(liveness.passed);
    assert_eq!(liveness.reason, LivenessReason::Passed);
}

#[test]
fn reused_challenge_degrades_to_denied_not_error() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    let challenge = h.engine.challenges().issue(Some("alice"), None).unwrap();
    h.engine
        .challenges()
        .validate(&challenge.challenge_id, &challenge.prompt_text)
        .unwrap();

    // Second use of the same challenge: captured as liveness failure, the
    // voice score still completes and the attempt is logged.
    let verdict = h
        .engine
        .verify(
            &axis_vec(0),
            "alice",
            VerifyOptions {
                challenge_id: Some(challenge.challenge_id.clone()),
                transcription: Some(challenge.prompt_text.clone()),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(verdict.voice_pass);
    assert!(!verdict.granted());
    assert_eq!(
        verdict.liveness.unwrap().reason,
        LivenessReason::ChallengeUsed
    );
}

#[test]
fn missing_transcription_fails_liveness() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    let challenge = h.engine.challenges().issue(Some("alice"), None).unwrap();
    let verdict = h
        .engine
        .verify(
            &axis_vec(0),
            "alice",
            VerifyOptions {
                challenge_id: Some(challenge.challenge_id.clone()),
                transcription: None,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!verdict.granted());
    assert_eq!(
        verdict.liveness.unwrap().reason,
        LivenessReason::TranscriptionUnavailable
    );
}

#[test]
fn every_reached_decision_appends_one_log_row() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    h.engine
        .verify(&axis_vec(0), "alice", VerifyOptions::default())
        .unwrap();
    h.engine
        .verify(&axis_vec(1), "alice", VerifyOptions::default())
        .unwrap();
    let challenge = h.engine.challenges().issue(Some("alice"), None).unwrap();
    h.engine
        .verify(
            &axis_vec(0),
            "alice",
            VerifyOptions {
                challenge_id: Some(challenge.challenge_id.clone()),
                transcription: Some("wrong words entirely".into()),
                ..Default::default()
            },
        )
        .unwrap();

    let logs = h.store.access_logs(Some("alice"), 100).unwrap();
    assert_eq!(logs.len(), 3);
    let granted = logs.iter().filter(|l| l.decision == Decision::Granted).count();
    assert_eq!(granted, 1);
    // The challenge attempt carries its liveness evidence.
    let challenged = logs
        .iter()
        .find(|l| l.challenge_id.is_some())
        .expect("challenge attempt logged");
    assert_eq!(challenged.sentence_match, Some(false));
    assert_eq!(challenged.liveness_passed, Some(false));
}

#[test]
fn custom_threshold_overrides_default() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    // Two axes at 45 degrees: score ~0.707.
    let mut blended = vec![0.0f32; DIM];
    blended[0] = 1.0;
    blended[1] = 1.0;
    let samples = vec![blended.clone(), blended.clone(), blended];
    h.fusion.enroll("alice", "Alice", &samples).unwrap();

    let probe = axis_vec(0);
    let strict = h
        .engine
        .verify(
            &probe,
            "alice",
            VerifyOptions {
                threshold: Some(0.9),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(!strict.granted());

    let lenient = h
        .engine
        .verify(
            &probe,
            "alice",
            VerifyOptions {
                threshold: Some(0.5),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(lenient.granted());
}

#[test]
fn identify_ranks_and_filters() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "user_a", "User A", 1);
    enroll_on_axis(&h, "user_b", "User B", 0);
    enroll_on_axis(&h, "user_c", "User C", 2);

    // Probe close to B's axis with small leakage toward A and C.
    let mut probe = vec![0.0f32; DIM];
    probe[0] = 0.95;
    probe[1] = 0.30;
    probe[2] = 0.10;

    let matches = h.engine.identify(&probe, Some(0.5), 5).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].user_id, "user_b");
    assert!(matches[0].score > 0.9);
}

#[test]
fn identify_empty_when_nothing_clears_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    enroll_on_axis(&h, "alice", "Alice", 0);

    let matches = h.engine.identify(&axis_vec(3), Some(0.5), 5).unwrap();
    assert!(matches.is_empty());
}

#[test]
fn identify_truncates_to_top_n_with_stable_ties() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    // Three users on the same axis tie exactly; enrollment order breaks it.
    enroll_on_axis(&h, "first", "First", 0);
    enroll_on_axis(&h, "second", "Second", 0);
    enroll_on_axis(&h, "third", "Third", 0);

    let matches = h.engine.identify(&axis_vec(0), Some(0.5), 2).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].user_id, "first");
    assert_eq!(matches[1].user_id, "second");
}

#[test]
fn liveness_disabled_passes_through() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(ProfileStore::open(dir.path().join("vocalis.db"), DIM).unwrap());
    let verification = VerificationConfig::default();
    let liveness = LivenessConfig {
        enabled: false,
        ..Default::default()
    };
    let challenges = ChallengeEngine::new(store.clone(), &liveness);
    let engine = DecisionEngine::new(store.clone(), challenges, &verification, &liveness);
    let fusion = TemplateFusion::new(store, &verification);

    let samples = vec![axis_vec(0), axis_vec(0), axis_vec(0)];
    fusion.enroll("alice", "Alice", &samples).unwrap();

    let verdict = engine
        .verify(
            &axis_vec(0),
            "alice",
            VerifyOptions {
                challenge_id: Some("ignored".into()),
                transcription: None,
                ..Default::default()
            },
        )
        .unwrap();
    assert!(verdict.granted());
    assert!(verdict.liveness.is_none());
}
