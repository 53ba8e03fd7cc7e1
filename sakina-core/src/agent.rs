//! Enterprise conversational agent client.
//!
//! Every call exchanges the long-lived API key for a short-lived bearer
//! token, then posts the message, the conversation history and the system
//! prompt to the assistant's versioned message endpoint. Tokens are not
//! cached between calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{required, AgentConfig};
use crate::conversation::{ConversationAdapter, ConversationError};
use crate::models::{ChatRole, ChatTurn};

const API_KEY_GRANT: &str = "urn:ibm:params:oauth:grant-type:apikey";

// ============================================================================
// Agent API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    input: MessageInput<'a>,
    context: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct MessageInput<'a> {
    message_type: &'static str,
    text: &'a str,
    options: MessageOptions,
}

#[derive(Debug, Serialize)]
struct MessageOptions {
    return_context: bool,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    output: MessageOutput,
}

#[derive(Debug, Deserialize)]
struct MessageOutput {
    #[serde(default)]
    generic: Vec<GenericItem>,
}

#[derive(Debug, Deserialize)]
struct GenericItem {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgentErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

// ============================================================================
// EnterpriseAgentClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct EnterpriseAgentClient {
    client: Client,
    api_key: String,
    base_url: String,
    assistant_id: String,
    token_url: String,
    version: String,
}

impl EnterpriseAgentClient {
    /// Fails if the API key, base URL or assistant id is absent.
    pub fn new(config: &AgentConfig) -> Result<Self, ConversationError> {
        let api_key = required(&config.api_key).ok_or(ConversationError::MissingConfig("agent.api_key"))?;
        let base_url =
            required(&config.base_url).ok_or(ConversationError::MissingConfig("agent.base_url"))?;
        let assistant_id = required(&config.assistant_id)
            .ok_or(ConversationError::MissingConfig("agent.assistant_id"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            assistant_id: assistant_id.to_string(),
            token_url: config.token_url.clone(),
            version: config.version.clone(),
        })
    }

    async fn check(response: Response, step: &str) -> Result<Response, ConversationError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AgentErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error.or(e.error_message))
            .unwrap_or(body);

        tracing::error!(code = status.as_u16(), step, message = %message, "Agent API error");
        Err(ConversationError::Api {
            code: status.as_u16(),
            message,
        })
    }

    /// Exchange the API key for a bearer token.
    async fn fetch_token(&self) -> Result<String, ConversationError> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&[("grant_type", API_KEY_GRANT), ("apikey", self.api_key.as_str())])
            .send()
            .await?;

        let token: TokenResponse = Self::check(response, "token").await?.json().await?;
        Ok(token.access_token)
    }

    fn message_url(&self) -> String {
        format!(
            "{}/v2/assistants/{}/message?version={}",
            self.base_url, self.assistant_id, self.version
        )
    }
}

fn history_entries(history: &[ChatTurn]) -> Vec<serde_json::Value> {
    history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            json!({ "role": role, "content": turn.content })
        })
        .collect()
}

#[async_trait]
impl ConversationAdapter for EnterpriseAgentClient {
    async fn respond(
        &self,
        message: &str,
        history: &[ChatTurn],
        system_prompt: &str,
    ) -> Result<String, ConversationError> {
        let token = self.fetch_token().await?;

        let request = MessageRequest {
            input: MessageInput {
                message_type: "text",
                text: message,
                options: MessageOptions {
                    return_context: true,
                },
            },
            context: json!({
                "global": {
                    "system": { "turn_count": history.len() + 1 }
                },
                "skills": {
                    "main skill": {
                        "user_defined": {
                            "system_prompt": system_prompt,
                            "conversation_history": history_entries(history),
                        }
                    }
                }
            }),
        };

        let response = self
            .client
            .post(self.message_url())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;

        let body: MessageResponse = Self::check(response, "message").await?.json().await?;

        body.output
            .generic
            .into_iter()
            .filter_map(|item| item.text)
            .find(|text| !text.trim().is_empty())
            .ok_or(ConversationError::EmptyReply)
    }

    fn name(&self) -> &str {
        "enterprise-agent"
    }
}

// ============================================================================
// TESTS
// ============================================================================
