//! Runtime configuration loaded from `.env` or a TOML file.
//!
//! Every tunable the engines consume (thresholds, sample minimums, challenge
//! TTL, database path) is resolved here once, at the boundary, instead of
//! being threaded as nullable arguments through every call.

use crate::prompts::Complexity;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn default_sample_rate() -> u32 {
    16_000
}

fn default_true() -> bool {
    true
}

fn default_embedding_dim() -> usize {
    192
}

fn default_similarity_threshold() -> f32 {
    0.7
}

fn default_min_enrollment_samples() -> usize {
    3
}

fn default_match_threshold() -> f32 {
    0.8
}

fn default_challenge_ttl_secs() -> i64 {
    300
}

fn default_complexity() -> Complexity {
    Complexity::Medium
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/vocalis/vocalis.db")
}

/// Audio preprocessing expectations. The core never touches raw audio; these
/// describe what the collaborator pipeline is expected to deliver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Expected sample rate of preprocessed audio.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Expect mono input.
    #[serde(default = "default_true")]
    pub mono: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            mono: true,
        }
    }
}

/// Speaker embedding contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Fixed embedding dimensionality. Stored blobs and probes must agree;
    /// a mismatch is a fatal configuration error.
    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dim: default_embedding_dim(),
        }
    }
}

/// Verification decision tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Cosine score at or above this value passes the voice check.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Minimum audio samples required to enroll.
    #[serde(default = "default_min_enrollment_samples")]
    pub min_enrollment_samples: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            min_enrollment_samples: default_min_enrollment_samples(),
        }
    }
}

/// Liveness challenge tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// When false, `verify` treats liveness as pass-through true.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sentence similarity at or above this value passes the liveness check.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f32,
    /// Challenge time-to-live in seconds.
    #[serde(default = "default_challenge_ttl_secs")]
    pub challenge_ttl_secs: i64,
    /// Default prompt complexity when the caller does not pick one.
    #[serde(default = "default_complexity")]
    pub sentence_complexity: Complexity,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            match_threshold: default_match_threshold(),
            challenge_ttl_secs: default_challenge_ttl_secs(),
            sentence_complexity: default_complexity(),
        }
    }
}

/// Database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path. Parent directories are created on open.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Top-level configuration.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | VOCALIS_DB_PATH | data/vocalis/vocalis.db | SQLite database file. |
/// | VOCALIS_EMBEDDING_DIM | 192 | Embedding dimensionality. |
/// | VOCALIS_SIMILARITY_THRESHOLD | 0.7 | Voice-match accept threshold. |
/// | VOCALIS_MIN_ENROLLMENT_SAMPLES | 3 | Samples required to enroll. |
/// | VOCALIS_LIVENESS_ENABLED | true | Gate verification on liveness. |
/// | VOCALIS_LIVENESS_THRESHOLD | 0.8 | Sentence-match accept threshold. |
/// | VOCALIS_CHALLENGE_TTL_SECS | 300 | Challenge lifetime. |
/// | VOCALIS_SENTENCE_COMPLEXITY | medium | simple \| medium \| complex. |
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocalisConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl VocalisConfig {
    /// Load from environment. Unset or invalid values fall back to defaults
    /// (see the table in the struct docs).
    pub fn from_env() -> Self {
        Self {
            audio: AudioConfig {
                sample_rate: env_u32("VOCALIS_SAMPLE_RATE", default_sample_rate()),
                mono: env_bool("VOCALIS_MONO", true),
            },
            embedding: EmbeddingConfig {
                dim: env_usize("VOCALIS_EMBEDDING_DIM", default_embedding_dim()),
            },
            verification: VerificationConfig {
                similarity_threshold: env_f32(
                    "VOCALIS_SIMILARITY_THRESHOLD",
                    default_similarity_threshold(),
                ),
                min_enrollment_samples: env_usize(
                    "VOCALIS_MIN_ENROLLMENT_SAMPLES",
                    default_min_enrollment_samples(),
                ),
            },
            liveness: LivenessConfig {
                enabled: env_bool("VOCALIS_LIVENESS_ENABLED", true),
                match_threshold: env_f32("VOCALIS_LIVENESS_THRESHOLD", default_match_threshold()),
                challenge_ttl_secs: env_i64(
                    "VOCALIS_CHALLENGE_TTL_SECS",
                    default_challenge_ttl_secs(),
                ),
                sentence_complexity: std::env::var("VOCALIS_SENTENCE_COMPLEXITY")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or_else(default_complexity),
            },
            database: DatabaseConfig {
                db_path: std::env::var("VOCALIS_DB_PATH")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| default_db_path()),
            },
        }
    }

    /// Load from a TOML file; missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: VocalisConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save_to_path(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => v.trim().eq_ignore_ascii_case("true") || (v.trim().is_empty() && default),
        Err(_) => default,
    }
}

fn env_f32(name: &str, default: f32) -> f32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = VocalisConfig::default();
        assert_eq!(cfg.embedding.dim, 192);
        assert!((cfg.verification.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert_eq!(cfg.verification.min_enrollment_samples, 3);
        assert!(cfg.liveness.enabled);
        assert_eq!(cfg.liveness.challenge_ttl_secs, 300);
        assert_eq!(cfg.liveness.sentence_complexity, Complexity::Medium);
    }

    #[test]
    fn toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vocalis.toml");
        let mut cfg = VocalisConfig::default();
        cfg.verification.similarity_threshold = 0.65;
        cfg.liveness.sentence_complexity = Complexity::Complex;
        cfg.save_to_path(&path).unwrap();

        let loaded = VocalisConfig::load_from_path(&path).unwrap();
        assert!((loaded.verification.similarity_threshold - 0.65).abs() < f32::EPSILON);
        assert_eq!(loaded.liveness.sentence_complexity, Complexity::Complex);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = VocalisConfig::load_from_path(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.embedding.dim, 192);
    }
}
