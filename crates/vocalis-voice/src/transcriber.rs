//! **Speech-to-text** — convert the spoken challenge response into text for
//! the liveness gate.
//!
//! Implement `Transcriber` for local Whisper or a remote OpenAI-compatible
//! transcription API. Transcription failure is not fatal: the caller maps
//! it to a failed liveness signal.

use crate::error::{VoiceError, VoiceResult};

/// Backend for converting WAV audio bytes to text.
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance. Returns an empty string when nothing was
    /// detected.
    fn transcribe(&self, wav_bytes: &[u8], language: &str) -> VoiceResult<String>;
}

/// Placeholder transcriber: returns a fixed string. Use for testing the
/// challenge loop without Whisper or an API key.
#[derive(Debug, Default)]
pub struct PlaceholderTranscriber {
    /// If set, return this instead of the default message.
    pub response: Option<String>,
}

impl PlaceholderTranscriber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(s: String) -> Self {
        Self { response: Some(s) }
    }
}

impl Transcriber for PlaceholderTranscriber {
    fn transcribe(&self, wav_bytes: &[u8], _language: &str) -> VoiceResult<String> {
        if let Some(ref r) = self.response {
            return Ok(r.clone());
        }
        Ok(format!(
            "[STT placeholder: {} bytes — connect Whisper or a transcription API]",
            wav_bytes.len()
        ))
    }
}

/// Production transcriber: OpenAI-compatible transcription API.
/// Uses `STT_API_URL` (e.g. https://api.openai.com/v1), `STT_API_KEY`, and
/// `STT_MODEL` (default whisper-1).
#[derive(Debug, Clone)]
pub struct RemoteTranscriber {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    /// Bearer API key.
    pub api_key: String,
    /// Model: whisper-1 or gpt-4o-transcribe, etc.
    pub model: String,
    client: reqwest::blocking::Client,
}

impl RemoteTranscriber {
    /// Build from environment: STT_API_URL, STT_API_KEY, STT_MODEL.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url = std::env::var("STT_API_URL")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());
        let api_key = std::env::var("STT_API_KEY")
            .map_err(|_| VoiceError::Config("transcriber requires STT_API_KEY".to_string()))?;
        let model = std::env::var("STT_MODEL").unwrap_or_else(|_| "whisper-1".to_string());
        Self::new(base_url, api_key, model)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }
}

impl Transcriber for RemoteTranscriber {
    fn transcribe(&self, wav_bytes: &[u8], language: &str) -> VoiceResult<String> {
        if wav_bytes.is_empty() {
            return Ok(String::new());
        }
        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let part = reqwest::blocking::multipart::Part::bytes(wav_bytes.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        let form = reqwest::blocking::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "text");
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Transcription(format!("{status}: {body}")));
        }
        let text = res
            .text()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;
        Ok(text.trim().to_string())
    }
}

/// Pick the best available transcriber: remote when STT_API_KEY is set,
/// placeholder otherwise.
pub fn create_transcriber() -> VoiceResult<Box<dyn Transcriber>> {
    if let Ok(remote) = RemoteTranscriber::from_env() {
        return Ok(Box::new(remote));
    }
    Ok(Box::new(PlaceholderTranscriber::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_returns_configured_response() {
        let stt = PlaceholderTranscriber::with_response("The blue car is outside".into());
        let text = stt.transcribe(&[0u8; 64], "en").unwrap();
        assert_eq!(text, "The blue car is outside");
    }

    #[test]
    fn placeholder_default_mentions_byte_count() {
        let stt = PlaceholderTranscriber::new();
        let text = stt.transcribe(&[0u8; 10], "en").unwrap();
        assert!(text.contains("10 bytes"));
    }
}
