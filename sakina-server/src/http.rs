//! Sakina HTTP REST API
//!
//! Each endpoint is a thin axum handler over an inner function that takes
//! the services and returns `(status, json_body)`, so the inner functions
//! can be tested without routing.
//!
//! Endpoints:
//! - GET  /health                  store status and configured adapters
//! - GET  /version                 server version info
//! - POST /checkins                submit a mood check-in
//! - POST /chat                    employee assistant
//! - POST /hr/chat                 HR assistant
//! - GET  /hr/summary              risk counts for today and the week
//! - POST /sentiment               classify free text
//! - GET  /employees/lookup        employee by `?email=`
//! - GET  /hr/managers/lookup      HR manager by `?email=`
//! - GET  /employees/:id/chat      chat history, oldest first
//! - GET  /employees/:id/activity  activity feed, newest first
//! - GET  /employees/:id/twin      digital-twin state and reports

use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use sakina_core::{ConversationError, SakinaConfig, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::services::chat::{ChatError, ChatRequest, HrChatRequest};
use crate::services::checkin::{CheckInSubmission, SubmitErrorKind};
use crate::services::AppServices;

/// Shared state for all HTTP handlers
pub struct HttpState {
    pub services: AppServices,
    pub config: SakinaConfig,
}

/// Build the Axum router with all endpoints
pub fn build_router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/checkins", post(checkin_handler))
        .route("/chat", post(chat_handler))
        .route("/hr/chat", post(hr_chat_handler))
        .route("/hr/summary", get(hr_summary_handler))
        .route("/sentiment", post(sentiment_handler))
        .route("/employees/lookup", get(employee_lookup_handler))
        .route("/hr/managers/lookup", get(manager_lookup_handler))
        .route("/employees/:id/chat", get(chat_history_handler))
        .route("/employees/:id/activity", get(activity_handler))
        .route("/employees/:id/twin", get(twin_handler))
        .with_state(state)
}

/// Serve on the configured address until the shutdown signal fires.
pub async fn start_http_server(
    services: AppServices,
    config: SakinaConfig,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = Arc::new(HttpState { services, config });

    let app = build_router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Sakina HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SentimentRequest {
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailParams {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

/// Standard HTTP error body
pub fn error_body(msg: impl std::fmt::Display) -> Value {
    json!({
        "error": msg.to_string(),
        "status": "error",
    })
}

fn store_failure(e: StoreError) -> (StatusCode, Value) {
    tracing::error!("Store read failed: {}", e);
    (StatusCode::BAD_GATEWAY, error_body(e))
}

fn to_body<T: Serialize>(value: &T) -> (StatusCode, Value) {
    match serde_json::to_value(value) {
        Ok(v) => (StatusCode::OK, v),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, error_body(e)),
    }
}

// ============================================================================
// Inner (directly testable) business logic functions
// ============================================================================

pub async fn health_inner(services: &AppServices) -> (StatusCode, Value) {
    let adapters = services.chat.adapter_names();
    let classifier = services.classifier.as_ref().map(|c| c.name().to_string());

    match services.store.health_check().await {
        Ok(store) => (
            StatusCode::OK,
            json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
                "store": store,
                "backend": services.store.name(),
                "adapters": adapters,
                "sentiment": classifier,
            }),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            json!({
                "status": "unhealthy",
                "backend": services.store.name(),
                "error": e.to_string(),
            }),
        ),
    }
}

/// Pure, no IO.
pub fn version_inner() -> Value {
    json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": "sakina/1",
    })
}

pub async fn checkin_inner(services: &AppServices, req: CheckInSubmission) -> (StatusCode, Value) {
    let outcome = services.checkins.submit(req).await;
    let status = match outcome.error_kind {
        None => StatusCode::OK,
        Some(SubmitErrorKind::Validation) => StatusCode::BAD_REQUEST,
        Some(SubmitErrorKind::Storage) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let (_, body) = to_body(&outcome);
    (status, body)
}

fn chat_result(result: Result<crate::services::chat::ChatReply, ChatError>) -> (StatusCode, Value) {
    match result {
        Ok(reply) => to_body(&reply),
        Err(ChatError::EmptyMessage) => (StatusCode::BAD_REQUEST, error_body("message field is required")),
        Err(ChatError::Conversation(ConversationError::NoAdapters)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body(ConversationError::NoAdapters),
        ),
        Err(e) => (StatusCode::BAD_GATEWAY, error_body(e)),
    }
}

pub async fn chat_inner(services: &AppServices, req: ChatRequest) -> (StatusCode, Value) {
    chat_result(services.chat.send(req).await)
}

pub async fn hr_chat_inner(services: &AppServices, req: HrChatRequest) -> (StatusCode, Value) {
    chat_result(services.chat.send_hr(req).await)
}

pub async fn hr_summary_inner(services: &AppServices) -> (StatusCode, Value) {
    to_body(&services.hr.summarize().await)
}

pub async fn sentiment_inner(services: &AppServices, req: SentimentRequest) -> (StatusCode, Value) {
    let Some(classifier) = &services.classifier else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            error_body("no sentiment classifier is configured"),
        );
    };
    let text = match req.text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return (StatusCode::BAD_REQUEST, error_body("text field is required")),
    };

    match classifier.classify_sentiment(&text).await {
        Ok(result) => to_body(&result),
        Err(e) => (StatusCode::BAD_GATEWAY, error_body(e)),
    }
}

fn required_email(params: &EmailParams) -> Option<&str> {
    params.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
}

pub async fn employee_lookup_inner(services: &AppServices, params: EmailParams) -> (StatusCode, Value) {
    let Some(email) = required_email(&params) else {
        return (StatusCode::BAD_REQUEST, error_body("email parameter is required"));
    };
    match services.profile.employee_by_email(email).await {
        Ok(Some(employee)) => to_body(&employee),
        Ok(None) => (StatusCode::NOT_FOUND, error_body("employee not found")),
        Err(e) => store_failure(e),
    }
}

pub async fn manager_lookup_inner(services: &AppServices, params: EmailParams) -> (StatusCode, Value) {
    let Some(email) = required_email(&params) else {
        return (StatusCode::BAD_REQUEST, error_body("email parameter is required"));
    };
    match services.profile.hr_manager_by_email(email).await {
        Ok(Some(manager)) => to_body(&manager),
        Ok(None) => (StatusCode::NOT_FOUND, error_body("HR manager not found")),
        Err(e) => store_failure(e),
    }
}

pub async fn chat_history_inner(services: &AppServices, employee_id: Uuid, params: LimitParams) -> (StatusCode, Value) {
    match services.profile.chat_history(employee_id, params.limit).await {
        Ok(entries) => to_body(&entries),
        Err(e) => store_failure(e),
    }
}

pub async fn activity_inner(services: &AppServices, employee_id: Uuid, params: LimitParams) -> (StatusCode, Value) {
    match services.profile.activity(employee_id, params.limit).await {
        Ok(entries) => to_body(&entries),
        Err(e) => store_failure(e),
    }
}

pub async fn twin_inner(services: &AppServices, employee_id: Uuid) -> (StatusCode, Value) {
    match services.profile.digital_twin(employee_id).await {
        Ok(view) => to_body(&view),
        Err(e) => store_failure(e),
    }
}

// ============================================================================
// Axum handler wrappers (thin, delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = health_inner(&state.services).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn checkin_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<CheckInSubmission>,
) -> impl IntoResponse {
    let (status, body) = checkin_inner(&state.services, req).await;
    (status, Json(body))
}

pub async fn chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<ChatRequest>,
) -> impl IntoResponse {
    let (status, body) = chat_inner(&state.services, req).await;
    (status, Json(body))
}

pub async fn hr_chat_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<HrChatRequest>,
) -> impl IntoResponse {
    let (status, body) = hr_chat_inner(&state.services, req).await;
    (status, Json(body))
}

pub async fn hr_summary_handler(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    let (status, body) = hr_summary_inner(&state.services).await;
    (status, Json(body))
}

pub async fn sentiment_handler(
    State(state): State<Arc<HttpState>>,
    Json(req): Json<SentimentRequest>,
) -> impl IntoResponse {
    let (status, body) = sentiment_inner(&state.services, req).await;
    (status, Json(body))
}

pub async fn employee_lookup_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<EmailParams>,
) -> impl IntoResponse {
    let (status, body) = employee_lookup_inner(&state.services, params).await;
    (status, Json(body))
}

pub async fn manager_lookup_handler(
    State(state): State<Arc<HttpState>>,
    Query(params): Query<EmailParams>,
) -> impl IntoResponse {
    let (status, body) = manager_lookup_inner(&state.services, params).await;
    (status, Json(body))
}

pub async fn chat_history_handler(
    State(state): State<Arc<HttpState>>,
    Path(employee_id): Path<Uuid>,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    let (status, body) = chat_history_inner(&state.services, employee_id, params).await;
    (status, Json(body))
}

pub async fn activity_handler(
    State(state): State<Arc<HttpState>>,
    Path(employee_id): Path<Uuid>,
    Query(params): Query<LimitParams>,
) -> impl IntoResponse {
    let (status, body) = activity_inner(&state.services, employee_id, params).await;
    (status, Json(body))
}

pub async fn twin_handler(
    State(state): State<Arc<HttpState>>,
    Path(employee_id): Path<Uuid>,
) -> impl IntoResponse {
    let (status, body) = twin_inner(&state.services, employee_id).await;
    (status, Json(body))
}

// ============================================================================
// Unit Tests: call inner functions directly
// ============================================================================
