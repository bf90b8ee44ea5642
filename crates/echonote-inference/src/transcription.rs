//! Transcription backend trait and OpenAI-compatible Whisper client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use echonote_core::{defaults, extension_for_mime, Error, Result};

/// A segment of transcribed audio with timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionSegment {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Result of audio transcription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptionResult {
    /// Full transcribed text.
    pub full_text: String,
    /// Timestamped segments.
    pub segments: Vec<TranscriptionSegment>,
    /// Detected language (ISO 639-1 code).
    pub language: Option<String>,
    /// Total audio duration in seconds.
    pub duration_secs: Option<f64>,
}

/// Backend for transcribing audio recordings.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Transcribe audio data.
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult>;

    /// Check if the transcription backend is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible Whisper backend (works with Speaches/faster-whisper-server).
pub struct WhisperBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl WhisperBackend {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
            timeout_secs: defaults::TRANSCRIBE_TIMEOUT_SECS,
        }
    }

    /// Override the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Create from environment variables.
    /// Returns None if WHISPER_BASE_URL is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_WHISPER_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let model = std::env::var(defaults::ENV_WHISPER_MODEL)
            .unwrap_or_else(|_| defaults::DEFAULT_WHISPER_MODEL.to_string());
        Some(Self::new(base_url, model))
    }
}

/// OpenAI Whisper API response format.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    segments: Option<Vec<WhisperSegment>>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Deserialize)]
struct WhisperSegment {
    start: f64,
    end: f64,
    text: String,
}

#[async_trait]
impl TranscriptionBackend for WhisperBackend {
    async fn transcribe(
        &self,
        audio_data: &[u8],
        mime_type: &str,
        language: Option<&str>,
    ) -> Result<TranscriptionResult> {
        let url = format!("{}/v1/audio/transcriptions", self.base_url);
        let ext = extension_for_mime(mime_type);

        let file_part = reqwest::multipart::Part::bytes(audio_data.to_vec())
            .file_name(format!("audio.{}", ext))
            .mime_str(mime_type)
            .map_err(|e| Error::Transcription(format!("failed to build multipart: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // Keep the status code in the message so categorization picks
            // up rate limiting and auth failures.
            return Err(Error::Transcription(format!(
                "whisper API returned {}: {}",
                status, body
            )));
        }

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| Error::Transcription(format!("failed to parse whisper response: {e}")))?;

        let segments = result
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptionSegment {
                start_secs: s.start,
                end_secs: s.end,
                text: s.text,
            })
            .collect();

        Ok(TranscriptionResult {
            full_text: result.text,
            segments,
            language: result.language,
            duration_secs: result.duration,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcription_result_serialization() {
        let result = TranscriptionResult {
            full_text: "Buy milk. Call the plumber.".to_string(),
            segments: vec![TranscriptionSegment {
                start_secs: 0.0,
                end_secs: 2.5,
                text: "Buy milk.".to_string(),
            }],
            language: Some("en".to_string()),
            duration_secs: Some(5.0),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["full_text"], "Buy milk. Call the plumber.");
        assert_eq!(json["segments"].as_array().unwrap().len(), 1);

        let back: TranscriptionResult = serde_json::from_value(json).unwrap();
        assert_eq!(back, result);
    }

    #[test]
    fn test_whisper_backend_new() {
        let backend =
            WhisperBackend::new("http://localhost:8000".to_string(), "whisper-1".to_string());
        assert_eq!(backend.model_name(), "whisper-1");
        assert_eq!(backend.timeout_secs, defaults::TRANSCRIBE_TIMEOUT_SECS);
    }

    #[test]
    fn test_whisper_backend_timeout_override() {
        let backend = WhisperBackend::new("http://x".to_string(), "m".to_string())
            .with_timeout_secs(10);
        assert_eq!(backend.timeout_secs, 10);
    }

    #[test]
    fn test_whisper_response_deserialization_minimal() {
        let json = r#"{"text": "Hello world"}"#;
        let response: WhisperResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text, "Hello world");
        assert!(response.segments.is_none());
        assert!(response.language.is_none());
        assert!(response.duration.is_none());
    }

    #[test]
    fn test_whisper_response_deserialization_full() {
        let json = r#"{
            "text": "Hello world",
            "segments": [{"start": 0.0, "end": 2.5, "text": "Hello"}],
            "language": "en",
            "duration": 2.5
        }"#;
        let response: WhisperResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.segments.unwrap().len(), 1);
        assert_eq!(response.language.unwrap(), "en");
    }
}
