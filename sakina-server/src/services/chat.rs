//! Chat orchestration for employees and HR managers.
//!
//! A reply is produced by the adapter chain (enterprise agent, then Gemini)
//! and the exchange is persisted only after a reply exists. When every
//! adapter fails nothing is written.

use std::sync::Arc;

use chrono::Utc;
use sakina_core::models::{AnalysisLog, ChatLogEntry, ChatTurn, CheckIn, Language};
use sakina_core::store::{insert_records, select_first};
use sakina_core::{AdapterChain, AttemptFailure, ConversationError, DataStore, Query, Table};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::hr_summary::HrSummaryService;
use super::locks::EmployeeLocks;
use super::prompts;
use super::{SecondaryRecord, WriteDiagnostic};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub employee_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HrChatRequest {
    pub manager_id: Uuid,
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
    #[serde(default)]
    pub language: Option<Language>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub adapter: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_attempts: Vec<AttemptFailure>,
    pub diagnostics: Vec<WriteDiagnostic>,
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

#[derive(Clone)]
pub struct ChatService {
    store: Arc<dyn DataStore>,
    chain: AdapterChain,
    hr: HrSummaryService,
    locks: EmployeeLocks,
    default_language: Language,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn DataStore>,
        chain: AdapterChain,
        hr: HrSummaryService,
        locks: EmployeeLocks,
        default_language: Language,
        history_limit: usize,
    ) -> Self {
        Self {
            store,
            chain,
            hr,
            locks,
            default_language,
            history_limit,
        }
    }

    pub fn adapter_names(&self) -> Vec<String> {
        self.chain.adapter_names()
    }

    /// Employee assistant: latest check-in as context.
    pub async fn send(&self, request: ChatRequest) -> Result<ChatReply, ChatError> {
        let message = non_empty(&request.message)?;
        let _guard = self.locks.acquire(request.employee_id).await;

        let language = request.language.unwrap_or(self.default_language);
        let context = self.latest_context(request.employee_id).await;
        let system_prompt = prompts::employee_system_prompt(language, context.as_deref());

        self.converse(request.employee_id, message, &request.history, &system_prompt)
            .await
    }

    /// HR assistant: the current HR summary as context, persisted under the
    /// manager's id.
    pub async fn send_hr(&self, request: HrChatRequest) -> Result<ChatReply, ChatError> {
        let message = non_empty(&request.message)?;
        let _guard = self.locks.acquire(request.manager_id).await;

        let language = request.language.unwrap_or(self.default_language);
        let summary = self.hr.summarize().await;
        let system_prompt = prompts::hr_system_prompt(language, &summary);

        self.converse(request.manager_id, message, &request.history, &system_prompt)
            .await
    }

    async fn converse(
        &self,
        owner_id: Uuid,
        message: &str,
        history: &[ChatTurn],
        system_prompt: &str,
    ) -> Result<ChatReply, ChatError> {
        let history = &history[history.len().saturating_sub(self.history_limit)..];
        let reply = self.chain.respond(message, history, system_prompt).await?;

        let mut diagnostics = Vec::new();
        let exchange = ChatLogEntry::exchange(owner_id, message, &reply.text, Utc::now());
        if let Err(e) = insert_records(self.store.as_ref(), Table::ChatLogs, &exchange).await {
            tracing::warn!(%owner_id, "Chat log write failed: {}", e);
            diagnostics.push(WriteDiagnostic {
                record: SecondaryRecord::ChatLog,
                error: e.to_string(),
            });
        }

        Ok(ChatReply {
            reply: reply.text,
            adapter: reply.adapter,
            failed_attempts: reply.failures,
            diagnostics,
        })
    }

    /// Context block from the latest check-in and its analysis. Read errors
    /// leave the chat without context.
    async fn latest_context(&self, employee_id: Uuid) -> Option<String> {
        let store = self.store.as_ref();
        let checkin: Option<CheckIn> = match select_first(
            store,
            Table::DailyCheckins,
            Query::new().eq("employee_id", employee_id).order_desc("created_at"),
        )
        .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%employee_id, "Chat context unavailable: {}", e);
                return None;
            }
        };

        let analysis: Option<AnalysisLog> = match &checkin {
            Some(c) => select_first(store, Table::AnalysisLogs, Query::new().eq("checkin_id", c.id))
                .await
                .unwrap_or_else(|e| {
                    tracing::warn!(%employee_id, "Analysis context unavailable: {}", e);
                    None
                }),
            None => None,
        };

        prompts::checkin_context(checkin.as_ref(), analysis.as_ref())
    }
}

fn non_empty(message: &str) -> Result<&str, ChatError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    Ok(trimmed)
}

// ============================================================================
// TESTS
// ============================================================================
