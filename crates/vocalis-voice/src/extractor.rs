//! **Embedding extraction** — convert preprocessed PCM into a fixed-length
//! speaker embedding for the decision core.
//!
//! Implement `EmbeddingExtractor` for a local model runtime or a remote
//! inference server. The contract: deterministic for a given input and
//! model version; failure is fatal to the current request.

use crate::audio::pcm_f32_to_wav;
use crate::error::{VoiceError, VoiceResult};
use serde::Deserialize;

/// Backend for turning normalized PCM samples into a speaker embedding.
pub trait EmbeddingExtractor: Send + Sync {
    /// Extract one embedding. PCM is mono f32; the returned vector always
    /// has [`EmbeddingExtractor::dim`] entries.
    fn extract(&self, samples: &[f32]) -> VoiceResult<Vec<f32>>;

    /// Fixed output dimensionality of this backend.
    fn dim(&self) -> usize;
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Placeholder extractor: a deterministic unit vector seeded from the audio
/// content. Use for wiring tests and development without a model runtime —
/// identical audio yields identical embeddings, so enrollment/verification
/// flows behave end to end.
#[derive(Debug, Clone)]
pub struct PlaceholderExtractor {
    dim: usize,
}

impl PlaceholderExtractor {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn seed(samples: &[f32]) -> u64 {
        let mut seed = 0x51E1_3E5D_9AC1_0F27u64 ^ (samples.len() as u64);
        for (i, &s) in samples.iter().enumerate() {
            seed ^= (s.to_bits() as u64).rotate_left((i % 61) as u32);
        }
        splitmix64(seed)
    }
}

impl EmbeddingExtractor for PlaceholderExtractor {
    fn extract(&self, samples: &[f32]) -> VoiceResult<Vec<f32>> {
        if samples.is_empty() {
            return Err(VoiceError::Extraction("empty audio buffer".into()));
        }
        let mut state = Self::seed(samples);
        let mut out = Vec::with_capacity(self.dim);
        let mut norm = 0.0f64;
        for _ in 0..self.dim {
            state = splitmix64(state);
            let v = ((state >> 40) & 0xFFFF) as f32 / 32_768.0 - 1.0;
            norm += (v as f64) * (v as f64);
            out.push(v);
        }
        norm = norm.sqrt();
        if norm > 0.0 {
            let scale = (1.0 / norm) as f32;
            for v in &mut out {
                *v *= scale;
            }
        }
        Ok(out)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Production extractor: posts WAV audio to a speaker-embedding inference
/// server and expects `{"embedding": [..]}` back.
/// Uses `EMBEDDING_API_URL`, `EMBEDDING_API_KEY`, `EMBEDDING_MODEL`
/// (default spkrec-ecapa-voxceleb) and `EMBEDDING_DIM` (default 192).
#[derive(Debug, Clone)]
pub struct RemoteExtractor {
    /// Base URL without trailing slash.
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    pub model: String,
    dim: usize,
    sample_rate: u32,
    client: reqwest::blocking::Client,
}

impl RemoteExtractor {
    /// Build from environment: EMBEDDING_API_URL, EMBEDDING_API_KEY,
    /// EMBEDDING_MODEL, EMBEDDING_DIM.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("EMBEDDING_API_URL")
            .map_err(|_| VoiceError::Config("extractor requires EMBEDDING_API_URL".to_string()))?;
        let api_key = std::env::var("EMBEDDING_API_KEY").unwrap_or_default();
        let model = std::env::var("EMBEDDING_MODEL")
            .unwrap_or_else(|_| "spkrec-ecapa-voxceleb".to_string());
        let dim = std::env::var("EMBEDDING_DIM")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(192);
        Self::new(base_url, api_key, model, dim, 16_000)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        dim: usize,
        sample_rate: u32,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Extraction(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            dim,
            sample_rate,
            client,
        })
    }
}

impl EmbeddingExtractor for RemoteExtractor {
    fn extract(&self, samples: &[f32]) -> VoiceResult<Vec<f32>> {
        if samples.is_empty() {
            return Err(VoiceError::Extraction("empty audio buffer".into()));
        }
        let wav = pcm_f32_to_wav(samples, self.sample_rate);
        let url = format!("{}/audio/embeddings", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Extraction(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Extraction(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Extraction(format!("{status}: {body}")));
        }
        let parsed: EmbeddingResponse = res
            .json()
            .map_err(|e| VoiceError::Extraction(e.to_string()))?;
        if parsed.embedding.len() != self.dim {
            return Err(VoiceError::DimensionMismatch {
                expected: self.dim,
                got: parsed.embedding.len(),
            });
        }
        Ok(parsed.embedding)
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Pick the best available extractor: remote when EMBEDDING_API_URL is set,
/// placeholder otherwise.
pub fn create_extractor(dim: usize) -> VoiceResult<Box<dyn EmbeddingExtractor>> {
    if let Ok(ext) = RemoteExtractor::from_env() {
        return Ok(Box::new(ext));
    }
    Ok(Box::new(PlaceholderExtractor::new(dim)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_deterministic() {
        let ext = PlaceholderExtractor::new(16);
        let samples = vec![0.1f32, -0.2, 0.3, 0.05];
        let a = ext.extract(&samples).unwrap();
        let b = ext.extract(&samples).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn placeholder_output_is_unit_norm() {
        let ext = PlaceholderExtractor::new(32);
        let samples: Vec<f32> = (0..160).map(|i| (i as f32 / 160.0).sin()).collect();
        let v = ext.extract(&samples).unwrap();
        let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn placeholder_distinguishes_different_audio() {
        let ext = PlaceholderExtractor::new(16);
        let a = ext.extract(&[0.1f32, 0.2, 0.3]).unwrap();
        let b = ext.extract(&[0.3f32, 0.2, 0.1]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn placeholder_rejects_empty_audio() {
        let ext = PlaceholderExtractor::new(16);
        assert!(matches!(
            ext.extract(&[]),
            Err(VoiceError::Extraction(_))
        ));
    }
}
