//! Conversational backends and the attempt chain over them.
//!
//! Two interchangeable adapters implement [`ConversationAdapter`]:
//! - **Enterprise agent** ([`crate::agent::EnterpriseAgentClient`]): token
//!   exchange, then an assistant message call
//! - **Gemini** ([`crate::gemini::GeminiClient`]): a single generation call,
//!   also the only [`SentimentClassifier`]
//!
//! [`AdapterChain`] tries adapters in order and stops at the first success.
//! Every attempt is bounded by a timeout and each adapter is tried at most
//! once per call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::{ChatTurn, SentimentResult};

// ============================================================================
// Traits
// ============================================================================

#[async_trait]
pub trait ConversationAdapter: Send + Sync {
    /// Produce the assistant reply to `message` given prior turns and the
    /// system prompt.
    async fn respond(
        &self,
        message: &str,
        history: &[ChatTurn],
        system_prompt: &str,
    ) -> Result<String, ConversationError>;

    /// Adapter name for logging and diagnostics.
    fn name(&self) -> &str;
}

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    /// Classify free text. Unparseable model output yields
    /// [`SentimentResult::neutral`]; only transport failures are errors.
    async fn classify_sentiment(&self, text: &str) -> Result<SentimentResult, ConversationError>;

    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ConversationError {
    #[error("Missing configuration: {0}")]
    MissingConfig(&'static str),

    #[error("HTTP request failed: {0}")]
    Http(reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no reply text")]
    EmptyReply,

    #[error("{adapter} did not answer within {after:?}")]
    Timeout { adapter: String, after: Duration },

    #[error("No conversational backend is configured")]
    NoAdapters,
}

// Request URLs can carry credentials, so they never reach error text.
impl From<reqwest::Error> for ConversationError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.without_url())
    }
}

// ============================================================================
// AdapterChain
// ============================================================================

/// A failed attempt recorded while walking the chain.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptFailure {
    pub adapter: String,
    pub error: String,
}

#[derive(Debug, Clone)]
pub struct ChainReply {
    pub text: String,
    pub adapter: String,
    pub failures: Vec<AttemptFailure>,
}

#[derive(Clone)]
pub struct AdapterChain {
    adapters: Vec<Arc<dyn ConversationAdapter>>,
    attempt_timeout: Duration,
}

impl AdapterChain {
    pub fn new(attempt_timeout: Duration) -> Self {
        Self {
            adapters: Vec::new(),
            attempt_timeout,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ConversationAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    /// Try each adapter once, in order, with identical arguments. Returns the
    /// first reply, or the last error when every adapter failed.
    pub async fn respond(
        &self,
        message: &str,
        history: &[ChatTurn],
        system_prompt: &str,
    ) -> Result<ChainReply, ConversationError> {
        let mut failures = Vec::new();
        let mut last_error = ConversationError::NoAdapters;

        for adapter in &self.adapters {
            let attempt = tokio::time::timeout(
                self.attempt_timeout,
                adapter.respond(message, history, system_prompt),
            )
            .await
            .unwrap_or_else(|_| {
                Err(ConversationError::Timeout {
                    adapter: adapter.name().to_string(),
                    after: self.attempt_timeout,
                })
            });

            match attempt {
                Ok(text) => {
                    if !failures.is_empty() {
                        tracing::info!(adapter = adapter.name(), "Fallback adapter answered");
                    }
                    return Ok(ChainReply {
                        text,
                        adapter: adapter.name().to_string(),
                        failures,
                    });
                }
                Err(e) => {
                    tracing::warn!(adapter = adapter.name(), error = %e, "Conversational adapter failed");
                    failures.push(AttemptFailure {
                        adapter: adapter.name().to_string(),
                        error: e.to_string(),
                    });
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

// ============================================================================
// TESTS
// ============================================================================
