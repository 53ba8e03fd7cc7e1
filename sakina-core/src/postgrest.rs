//! PostgREST backend for [`DataStore`], the hosted store's REST surface.
//!
//! Writes are sent once. Selects and counts are idempotent and are retried
//! on transport errors and 5xx responses with exponential backoff. Counts
//! use `Prefer: count=exact` on a `HEAD` request and read the total from
//! `Content-Range`, so the server's row cap does not apply to them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::{required, StoreConfig};
use crate::store::{validate_column, DataStore, Filter, FilterValue, Query, StoreError, Table};

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostgrestStore {
    client: Client,
    base_url: String,
    api_key: String,
    read_retries: usize,
}

impl PostgrestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let base_url = required(&config.url).ok_or(StoreError::MissingConfig("store.url"))?;
        let api_key = required(&config.api_key).ok_or(StoreError::MissingConfig("store.api_key"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            read_retries: config.read_retries,
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.as_str())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<PostgrestErrorBody>(&body)
            .ok()
            .and_then(|e| match (e.message, e.details) {
                (Some(m), Some(d)) => Some(format!("{} ({})", m, d)),
                (m, d) => m.or(d),
            })
            .unwrap_or(body);

        tracing::error!(code = status.as_u16(), message = %message, "PostgREST error");
        Err(StoreError::Api {
            code: status.as_u16(),
            message,
        })
    }

    async fn select_once(
        &self,
        table: Table,
        params: &[(String, String)],
    ) -> Result<Vec<Value>, StoreError> {
        let request = self.client.get(self.table_url(table)).query(params);
        let response = Self::check(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn count_once(&self, table: Table, params: &[(String, String)]) -> Result<u64, StoreError> {
        let request = self
            .client
            .head(self.table_url(table))
            .query(params)
            .header("Prefer", "count=exact");
        let response = Self::check(self.authorized(request).send().await?).await?;

        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(content_range_total)
            .ok_or(StoreError::EmptyResponse(table.as_str()))
    }

    fn read_strategy(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(100)
            .max_delay(Duration::from_secs(2))
            .map(jitter)
            .take(self.read_retries)
    }
}

/// Total from a `Content-Range` value such as `0-24/3573` or `*/3573`.
fn content_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

fn is_transient(error: &StoreError) -> bool {
    match error {
        StoreError::Http(_) => true,
        StoreError::Api { code, .. } => *code >= 500,
        _ => false,
    }
}

fn quote(value: &FilterValue) -> String {
    format!("\"{}\"", value.to_query_string().replace('"', "\\\""))
}

/// Render a [`Query`] into PostgREST query parameters.
pub fn query_params(query: &Query) -> Result<Vec<(String, String)>, StoreError> {
    let mut params = filter_params(query)?;
    if let Some(order) = &query.order {
        let direction = if order.descending { "desc" } else { "asc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    Ok(params)
}

/// `select=*` plus one parameter per filter.
fn filter_params(query: &Query) -> Result<Vec<(String, String)>, StoreError> {
    for column in query.columns() {
        validate_column(column)?;
    }

    let mut params = vec![("select".to_string(), "*".to_string())];
    for filter in &query.filters {
        let rendered = match filter {
            Filter::Eq(_, v) => format!("eq.{}", v.to_query_string()),
            Filter::Gte(_, v) => format!("gte.{}", v.to_query_string()),
            Filter::Lt(_, v) => format!("lt.{}", v.to_query_string()),
            Filter::In(_, vs) => {
                let items: Vec<String> = vs.iter().map(quote).collect();
                format!("in.({})", items.join(","))
            }
        };
        params.push((filter.column().to_string(), rendered));
    }
    Ok(params)
}

#[async_trait]
impl DataStore for PostgrestStore {
    async fn insert_one(&self, table: Table, row: Value) -> Result<Value, StoreError> {
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=representation")
            .json(&row);
        let response = Self::check(self.authorized(request).send().await?).await?;

        let mut rows: Vec<Value> = response.json().await?;
        if rows.is_empty() {
            return Err(StoreError::EmptyResponse(table.as_str()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn insert_many(&self, table: Table, rows: Vec<Value>) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(&rows);
        Self::check(self.authorized(request).send().await?).await?;
        Ok(())
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, StoreError> {
        let params = query_params(query)?;
        RetryIf::spawn(self.read_strategy(), || self.select_once(table, &params), is_transient).await
    }

    async fn count(&self, table: Table, query: &Query) -> Result<u64, StoreError> {
        let params = filter_params(query)?;
        RetryIf::spawn(self.read_strategy(), || self.count_once(table, &params), is_transient).await
    }

    async fn health_check(&self) -> Result<String, StoreError> {
        let request = self.client.get(format!("{}/rest/v1/", self.base_url));
        let response = Self::check(self.authorized(request).send().await?).await?;
        Ok(format!("postgrest {}", response.status()))
    }

    fn name(&self) -> &str {
        "postgrest"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;
    use crate::store::MAX_FILTER_VALUES;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(url: &str) -> StoreConfig {
        StoreConfig {
            backend: "postgrest".to_string(),
            url: Some(url.to_string()),
            api_key: Some("service-key".to_string()),
            max_connections: 1,
            timeout_secs: 5,
            read_retries: 2,
        }
    }

    #[test]
    fn test_missing_url_or_key_fails_construction() {
        let mut config = test_config("http://localhost");
        config.url = None;
        assert!(matches!(
            PostgrestStore::new(&config),
            Err(StoreError::MissingConfig("store.url"))
        ));

        let mut config = test_config("http://localhost");
        config.api_key = Some(" ".to_string());
        assert!(matches!(
            PostgrestStore::new(&config),
            Err(StoreError::MissingConfig("store.api_key"))
        ));
    }

    #[test]
    fn test_query_params_rendering() {
        let employee = Uuid::nil();
        let since = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let query = Query::new()
            .eq("employee_id", employee)
            .gte("created_at", since)
            .any_of("risk_level", ["HIGH", "MEDIUM"])
            .order_desc("created_at")
            .limit(1);

        let params = query_params(&query).unwrap();
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("employee_id".to_string(), format!("eq.{}", employee)),
                ("created_at".to_string(), "gte.2025-03-01T00:00:00+00:00".to_string()),
                ("risk_level".to_string(), "in.(\"HIGH\",\"MEDIUM\")".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_params_offset_and_chunk_url_length() {
        let params = query_params(&Query::new().order_asc("id").limit(1000).offset(2000)).unwrap();
        assert_eq!(params[2], ("limit".to_string(), "1000".to_string()));
        assert_eq!(params[3], ("offset".to_string(), "2000".to_string()));

        let ids: Vec<Uuid> = (0..MAX_FILTER_VALUES).map(|_| Uuid::new_v4()).collect();
        let query = Query::new()
            .eq("risk_level", "HIGH")
            .any_of("checkin_id", ids)
            .order_asc("id")
            .limit(1000)
            .offset(1000);
        let url = reqwest::Url::parse_with_params(
            "https://project.supabase.co/rest/v1/analysis_logs",
            query_params(&query).unwrap(),
        )
        .unwrap();
        assert!(url.as_str().len() < 8_000, "url is {} bytes", url.as_str().len());
    }

    #[test]
    fn test_content_range_total() {
        assert_eq!(content_range_total("0-24/3573"), Some(3573));
        assert_eq!(content_range_total("*/0"), Some(0));
        assert_eq!(content_range_total("0-24/*"), None);
        assert_eq!(content_range_total("garbage"), None);
    }

    #[tokio::test]
    async fn test_count_reads_exact_total_without_order_or_limit() {
        let mock_server = MockServer::start().await;
        let store = PostgrestStore::new(&test_config(&mock_server.uri())).unwrap();

        Mock::given(method("HEAD"))
            .and(path("/rest/v1/daily_checkins"))
            .and(header("prefer", "count=exact"))
            .and(header("apikey", "service-key"))
            .and(query_param("created_at", "gte.2025-03-01T00:00:00+00:00"))
            .and(query_param_is_missing("limit"))
            .and(query_param_is_missing("order"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "*/4210"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let since = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let query = Query::new().gte("created_at", since).order_desc("created_at").limit(5);
        let total = store.count(Table::DailyCheckins, &query).await.unwrap();
        assert_eq!(total, 4210);
    }

    #[tokio::test]
    async fn test_count_without_content_range_is_an_error() {
        let mock_server = MockServer::start().await;
        let store = PostgrestStore::new(&test_config(&mock_server.uri())).unwrap();

        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            store.count(Table::AnalysisLogs, &Query::new()).await,
            Err(StoreError::EmptyResponse("analysis_logs"))
        ));
    }

    #[tokio::test]
    async fn test_insert_one_returns_representation() {
        let mock_server = MockServer::start().await;
        let store = PostgrestStore::new(&test_config(&mock_server.uri())).unwrap();
        let row = serde_json::json!({"id": "c1", "mood_score": 4});

        Mock::given(method("POST"))
            .and(path("/rest/v1/daily_checkins"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(header("prefer", "return=representation"))
            .and(body_json(row.clone()))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([row.clone()])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let stored = store.insert_one(Table::DailyCheckins, row.clone()).await.unwrap();
        assert_eq!(stored, row);
    }

    #[tokio::test]
    async fn test_insert_error_is_not_retried() {
        let mock_server = MockServer::start().await;
        let store = PostgrestStore::new(&test_config(&mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "message": "upstream unavailable"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = store
            .insert_many(Table::ChatLogs, vec![serde_json::json!({"id": 1})])
            .await;
        match result {
            Err(StoreError::Api { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_select_retries_on_5xx_then_succeeds() {
        let mock_server = MockServer::start().await;
        let store = PostgrestStore::new(&test_config(&mock_server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/rest/v1/analysis_logs"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rest/v1/analysis_logs"))
            .and(query_param("risk_level", "eq.HIGH"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "a1"}])),
            )
            .mount(&mock_server)
            .await;

        let rows = store
            .select(Table::AnalysisLogs, &Query::new().eq("risk_level", "HIGH"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_select_does_not_retry_client_errors() {
        let mock_server = MockServer::start().await;
        let store = PostgrestStore::new(&test_config(&mock_server.uri())).unwrap();

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "message": "column does not exist",
                "details": "employees.nope"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let result = store
            .select(Table::Employees, &Query::new().eq("email", "a@b.c"))
            .await;
        match result {
            Err(StoreError::Api { code, message }) => {
                assert_eq!(code, 400);
                assert_eq!(message, "column does not exist (employees.nope)");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }
}
