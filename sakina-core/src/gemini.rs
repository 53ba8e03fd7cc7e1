//! Gemini generative client, the fallback conversational backend and the
//! sentiment classifier.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{required, GenerativeConfig};
use crate::conversation::{ConversationAdapter, ConversationError, SentimentClassifier};
use crate::models::{ChatRole, ChatTurn, SentimentResult};

const SENTIMENT_PROMPT: &str = "Analyze the sentiment of the following employee wellbeing note. \
Respond with only a JSON object of the form \
{\"sentiment\": \"POSITIVE\" | \"NEUTRAL\" | \"NEGATIVE\", \"score\": <number between 0 and 1>, \
\"emotion\": \"<one lowercase word>\"}.\n\nNote:\n";

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(config: &GenerativeConfig) -> Result<Self, ConversationError> {
        let api_key =
            required(&config.api_key).ok_or(ConversationError::MissingConfig("generative.api_key"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Single generation call with a flat prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String, ConversationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = GenerateRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(ConversationError::Api { code, message });
        }

        let body: GenerateResponse = response.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ConversationError::EmptyReply);
        }
        Ok(text.trim().to_string())
    }
}

/// Flatten role-tagged history into `User: …` / `Assistant: …` lines.
pub fn transcript(history: &[ChatTurn]) -> String {
    history
        .iter()
        .map(|turn| match turn.role {
            ChatRole::User => format!("User: {}", turn.content),
            ChatRole::Assistant => format!("Assistant: {}", turn.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn chat_prompt(message: &str, history: &[ChatTurn], system_prompt: &str) -> String {
    let mut prompt = String::from(system_prompt);
    if !history.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&transcript(history));
    }
    prompt.push_str("\n\nUser: ");
    prompt.push_str(message);
    prompt.push_str("\nAssistant:");
    prompt
}

fn code_fence() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("fence pattern is valid")
    })
}

/// Parse a model's sentiment reply, tolerating markdown fences. Anything
/// that does not decode yields the neutral default.
pub fn parse_sentiment(raw: &str) -> SentimentResult {
    let body = code_fence()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map_or(raw, |m| m.as_str())
        .trim();

    match serde_json::from_str::<SentimentResult>(body) {
        Ok(mut result) => {
            result.score = result.score.clamp(0.0, 1.0);
            result.emotion = result.emotion.trim().to_lowercase();
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unparseable sentiment reply, using neutral default");
            SentimentResult::neutral()
        }
    }
}

#[async_trait]
impl ConversationAdapter for GeminiClient {
    async fn respond(
        &self,
        message: &str,
        history: &[ChatTurn],
        system_prompt: &str,
    ) -> Result<String, ConversationError> {
        self.generate(&chat_prompt(message, history, system_prompt)).await
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[async_trait]
impl SentimentClassifier for GeminiClient {
    async fn classify_sentiment(&self, text: &str) -> Result<SentimentResult, ConversationError> {
        let prompt = format!("{}{}", SENTIMENT_PROMPT, text);
        match self.generate(&prompt).await {
            Ok(raw) => Ok(parse_sentiment(&raw)),
            Err(ConversationError::EmptyReply) => Ok(SentimentResult::neutral()),
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================
