//! Analysis backend trait and OpenAI-compatible chat client.
//!
//! The analysis call takes a transcript plus the owner's accumulated
//! knowledge context and returns a structured analysis document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use echonote_core::{defaults, Error, Result};

/// Structured analysis of one transcribed note.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteAnalysis {
    /// One-paragraph summary of the recording.
    pub summary: String,
    /// Key points extracted from the transcript.
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Concrete follow-ups mentioned in the recording.
    #[serde(default)]
    pub action_items: Vec<String>,
    /// Free-form insights worth folding into the owner's knowledge.
    #[serde(default)]
    pub insights: Option<JsonValue>,
}

impl NoteAnalysis {
    /// Serialize for persistence on the note row.
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

/// Backend for analyzing transcribed notes.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Analyze a transcript with the owner's prior knowledge as context.
    async fn analyze(&self, transcript: &str, context: &str) -> Result<NoteAnalysis>;

    /// Check if the analysis backend is reachable.
    async fn health_check(&self) -> Result<bool>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

const SYSTEM_PROMPT: &str = "You analyze transcribed voice notes. Respond with a single JSON \
object with fields: summary (string), key_points (array of strings), action_items (array of \
strings), insights (object or null). No prose outside the JSON.";

/// OpenAI-compatible chat-completion analysis backend.
pub struct ChatAnalysisBackend {
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl ChatAnalysisBackend {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> Self {
        Self {
            base_url,
            api_key,
            model,
            client: reqwest::Client::new(),
            timeout_secs: defaults::ANALYZE_TIMEOUT_SECS,
        }
    }

    /// Override the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Create from environment variables.
    /// Returns None if ANALYSIS_BASE_URL is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(defaults::ENV_ANALYSIS_BASE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let api_key = std::env::var(defaults::ENV_ANALYSIS_API_KEY).ok();
        let model = std::env::var(defaults::ENV_ANALYSIS_MODEL)
            .unwrap_or_else(|_| defaults::DEFAULT_ANALYSIS_MODEL.to_string());
        Some(Self::new(base_url, api_key, model))
    }

    /// Extract the JSON document from a model reply, tolerating code fences.
    fn parse_content(content: &str) -> NoteAnalysis {
        let trimmed = content.trim();
        let stripped = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .and_then(|s| s.strip_suffix("```"))
            .map(str::trim)
            .unwrap_or(trimmed);

        match serde_json::from_str::<NoteAnalysis>(stripped) {
            Ok(analysis) => analysis,
            Err(e) => {
                // A malformed reply still carries value as a plain summary.
                warn!(
                    subsystem = "inference",
                    component = "analysis",
                    error = %e,
                    "Analysis reply was not valid JSON; keeping raw text as summary"
                );
                NoteAnalysis {
                    summary: trimmed.to_string(),
                    key_points: Vec::new(),
                    action_items: Vec::new(),
                    insights: None,
                }
            }
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl AnalysisBackend for ChatAnalysisBackend {
    async fn analyze(&self, transcript: &str, context: &str) -> Result<NoteAnalysis> {
        if transcript.trim().is_empty() {
            return Err(Error::InvalidInput("empty transcript".to_string()));
        }

        let url = format!("{}/v1/chat/completions", self.base_url);

        let user_content = if context.is_empty() {
            format!("Transcript:\n{transcript}")
        } else {
            format!("Known context about this user:\n{context}\n\nTranscript:\n{transcript}")
        };

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            temperature: 0.2,
        };

        let mut req = self
            .client
            .post(&url)
            .json(&request)
            .timeout(std::time::Duration::from_secs(self.timeout_secs));

        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(Error::from)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Analysis(format!(
                "analysis API returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Analysis(format!("failed to parse chat response: {e}")))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| Error::Analysis("chat response had no choices".to_string()))?;

        Ok(Self::parse_content(content))
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/v1/models", self.base_url);
        let mut req = self
            .client
            .get(&url)
            .timeout(std::time::Duration::from_secs(5));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        match req.send().await {
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
    fn test_parse_content_plain_json() {
        let analysis = ChatAnalysisBackend::parse_content(
            r#"{"summary": "Groceries", "key_points": ["milk"], "action_items": ["buy milk"], "insights": null}"#,
        );
        assert_eq!(analysis.summary, "Groceries");
        assert_eq!(analysis.key_points, vec!["milk"]);
        assert_eq!(analysis.action_items, vec!["buy milk"]);
        assert!(analysis.insights.is_none());
    }

    #[test]
    fn test_parse_content_fenced_json() {
        let analysis = ChatAnalysisBackend::parse_content(
            "```json\n{\"summary\": \"Fenced\", \"key_points\": []}\n```",
        );
        assert_eq!(analysis.summary, "Fenced");
    }

    #[test]
    fn test_parse_content_missing_optional_fields() {
        let analysis = ChatAnalysisBackend::parse_content(r#"{"summary": "Just a summary"}"#);
        assert_eq!(analysis.summary, "Just a summary");
        assert!(analysis.key_points.is_empty());
        assert!(analysis.action_items.is_empty());
    }

    #[test]
    fn test_parse_content_non_json_falls_back_to_summary() {
        let analysis = ChatAnalysisBackend::parse_content("The user wants to buy milk.");
        assert_eq!(analysis.summary, "The user wants to buy milk.");
        assert!(analysis.key_points.is_empty());
    }

    #[test]
    fn test_to_value_round_trip() {
        let analysis = NoteAnalysis {
            summary: "s".to_string(),
            key_points: vec!["a".to_string()],
            action_items: vec![],
            insights: Some(serde_json::json!({"topic": "errands"})),
        };
        let value = analysis.to_value();
        assert_eq!(value["summary"], "s");
        assert_eq!(value["insights"]["topic"], "errands");
    }

    #[tokio::test]
    async fn test_analyze_rejects_empty_transcript() {
        let backend =
            ChatAnalysisBackend::new("http://localhost:9".to_string(), None, "m".to_string());
        let err = backend.analyze("   ", "").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
