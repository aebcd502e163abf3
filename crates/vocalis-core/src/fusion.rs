//! Template fusion: enrollment and incremental profile updates.
//!
//! Enrollment averages the sample embeddings and normalizes. Incremental
//! updates are a weighted centroid: each side is weighted by the number of
//! samples it represents, so a template built from 100 samples is not
//! equally swayed by a single new one.

use crate::config::VerificationConfig;
use crate::embedding;
use crate::error::{AuthError, AuthResult};
use crate::store::{ProfileStore, SpeakerTemplate};
use std::sync::Arc;
use tracing::info;

/// Builds and updates reference templates through the store handle.
#[derive(Clone)]
pub struct TemplateFusion {
    store: Arc<ProfileStore>,
    min_samples: usize,
}

impl TemplateFusion {
    pub fn new(store: Arc<ProfileStore>, cfg: &VerificationConfig) -> Self {
        Self {
            store,
            min_samples: cfg.min_enrollment_samples,
        }
    }

    /// Enroll a new speaker from one or more sample embeddings.
    ///
    /// Fails with [`AuthError::Validation`] before any store mutation when
    /// too few samples are supplied, and with [`AuthError::Conflict`] when
    /// the user already exists (the store's key constraint decides, so a
    /// racing duplicate enroll has exactly one winner).
    pub fn enroll(
        &self,
        user_id: &str,
        display_name: &str,
        samples: &[Vec<f32>],
    ) -> AuthResult<SpeakerTemplate> {
        if user_id.trim().is_empty() {
            return Err(AuthError::Validation("user_id must not be empty".into()));
        }
        if samples.len() < self.min_samples {
            return Err(AuthError::Validation(format!(
                "insufficient samples: got {}, need at least {}",
                samples.len(),
                self.min_samples
            )));
        }
        let mut template = embedding::mean_embedding(samples)?;
        embedding::l2_normalize(&mut template);
        let row = self.store.insert_speaker(
            user_id,
            display_name,
            &template,
            samples.len() as u32,
        )?;
        info!(user_id, samples = samples.len(), "enrolled speaker");
        Ok(row)
    }

    /// Update an existing template from new sample embeddings.
    ///
    /// With `replace = true` the old vector is discarded. Otherwise the new
    /// mean is fused into the stored vector by weighted centroid, inside a
    /// per-row atomic store update so concurrent updates of the same user
    /// see a consistent (vector, count) pair.
    pub fn update(
        &self,
        user_id: &str,
        new_samples: &[Vec<f32>],
        replace: bool,
    ) -> AuthResult<SpeakerTemplate> {
        if new_samples.is_empty() {
            return Err(AuthError::Validation("no update samples supplied".into()));
        }
        let mut new_mean = embedding::mean_embedding(new_samples)?;
        embedding::l2_normalize(&mut new_mean);
        let new_count = new_samples.len() as u32;

        let row = self.store.update_speaker_atomic(user_id, |current| {
            if replace {
                Ok((new_mean.clone(), new_count))
            } else {
                let fused = embedding::fuse_weighted(
                    &current.embedding,
                    current.sample_count,
                    &new_mean,
                    new_count,
                )?;
                Ok((fused, current.sample_count + new_count))
            }
        })?;
        info!(
            user_id,
            replace,
            sample_count = row.sample_count,
            "updated speaker template"
        );
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerificationConfig;

    fn fusion_with_store(dir: &std::path::Path) -> TemplateFusion {
        let store = Arc::new(ProfileStore::open(dir.join("test.db"), 4).unwrap());
        TemplateFusion::new(store, &VerificationConfig::default())
    }

    fn sample(values: [f32; 4]) -> Vec<f32> {
        values.to_vec()
    }

    #[test]
    fn enroll_requires_min_samples() {
        let dir = tempfile::tempdir().unwrap();
        let fusion = fusion_with_store(dir.path());
        let err = fusion
            .enroll("alice", "Alice", &[sample([1.0, 0.0, 0.0, 0.0])])
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[test]
    fn enroll_normalizes_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let fusion = fusion_with_store(dir.path());
        let samples = vec![
            sample([2.0, 0.0, 0.0, 0.0]),
            sample([0.0, 2.0, 0.0, 0.0]),
            sample([2.0, 2.0, 0.0, 0.0]),
        ];
        let row = fusion.enroll("alice", "Alice", &samples).unwrap();
        assert_eq!(row.sample_count, 3);
        let norm: f64 = row
            .embedding
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn incremental_update_adds_counts() {
        let dir = tempfile::tempdir().unwrap();
        let fusion = fusion_with_store(dir.path());
        let samples = vec![
            sample([1.0, 0.0, 0.0, 0.0]),
            sample([1.0, 0.0, 0.0, 0.0]),
            sample([1.0, 0.0, 0.0, 0.0]),
        ];
        fusion.enroll("alice", "Alice", &samples).unwrap();
        let row = fusion
            .update(
                "alice",
                &[sample([0.0, 1.0, 0.0, 0.0]), sample([0.0, 1.0, 0.0, 0.0])],
                false,
            )
            .unwrap();
        assert_eq!(row.sample_count, 5);
        let norm: f64 = row
            .embedding
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        // Old direction carries 3x the weight of the new mean's 2x.
        assert!(row.embedding[0] > row.embedding[1]);
    }

    #[test]
    fn replace_resets_count() {
        let dir = tempfile::tempdir().unwrap();
        let fusion = fusion_with_store(dir.path());
        let samples = vec![
            sample([1.0, 0.0, 0.0, 0.0]),
            sample([1.0, 0.0, 0.0, 0.0]),
            sample([1.0, 0.0, 0.0, 0.0]),
        ];
        fusion.enroll("alice", "Alice", &samples).unwrap();
        let row = fusion
            .update("alice", &[sample([0.0, 0.0, 1.0, 0.0])], true)
            .unwrap();
        assert_eq!(row.sample_count, 1);
        assert!((row.embedding[2] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn update_unknown_user_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fusion = fusion_with_store(dir.path());
        let err = fusion
            .update("ghost", &[sample([1.0, 0.0, 0.0, 0.0])], false)
            .unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[test]
    fn duplicate_enroll_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let fusion = fusion_with_store(dir.path());
        let samples = vec![
            sample([1.0, 0.0, 0.0, 0.0]),
            sample([0.0, 1.0, 0.0, 0.0]),
            sample([0.0, 0.0, 1.0, 0.0]),
        ];
        fusion.enroll("alice", "Alice", &samples).unwrap();
        let err = fusion.enroll("alice", "Alice Again", &samples).unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }
}
