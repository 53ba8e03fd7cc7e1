//! Backend Data Client.
//!
//! The services talk to the hosted relational store only through
//! [`DataStore`]: insert one row, insert many rows, select rows with a
//! declarative [`Query`], count matching rows. Rows are JSON objects;
//! [`insert_record`] and [`select_records`] add the serde typing on top.
//!
//! Hosted stores cap both the request URL and the rows returned per
//! response. [`select_all`] pages past the row cap and [`select_any_of`] /
//! [`count_any_of`] split long `IN` lists into [`MAX_FILTER_VALUES`] chunks.
//!
//! Backends:
//! - [`crate::postgrest::PostgrestStore`]: the store's REST surface (default)
//! - [`crate::db::PgStore`]: direct Postgres connection through sqlx
//! - [`MemoryStore`]: in-process tables for development and tests

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::StoreConfig;

// ============================================================================
// DataStore trait
// ============================================================================

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Insert a row and return it as stored.
    async fn insert_one(&self, table: Table, row: Value) -> Result<Value, StoreError>;

    async fn insert_many(&self, table: Table, rows: Vec<Value>) -> Result<(), StoreError>;

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, StoreError>;

    /// Exact number of rows matching the query's filters. Order, limit and
    /// offset are ignored.
    async fn count(&self, table: Table, query: &Query) -> Result<u64, StoreError>;

    /// Backend version or status line, for `/health`.
    async fn health_check(&self) -> Result<String, StoreError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Store API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Row (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Missing store configuration: {0}")]
    MissingConfig(&'static str),

    #[error("Unknown store backend '{0}'")]
    UnknownBackend(String),

    #[error("Invalid column name '{0}'")]
    InvalidColumn(String),

    #[error("Empty response from store for {0}")]
    EmptyResponse(&'static str),

    #[error("Injected failure on {0}")]
    Injected(&'static str),
}

// ============================================================================
// Tables and queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Employees,
    DailyCheckins,
    AnalysisLogs,
    ChatLogs,
    ActivityLogs,
    DigitalTwinStates,
    DigitalTwinReports,
    HrManagers,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Employees => "employees",
            Table::DailyCheckins => "daily_checkins",
            Table::AnalysisLogs => "analysis_logs",
            Table::ChatLogs => "chat_logs",
            Table::ActivityLogs => "activity_logs",
            Table::DigitalTwinStates => "digital_twin_states",
            Table::DigitalTwinReports => "digital_twin_reports",
            Table::HrManagers => "hr_managers",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed filter operand.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

impl FilterValue {
    /// Rendering used in REST query strings.
    pub fn to_query_string(&self) -> String {
        match self {
            FilterValue::Text(s) => s.clone(),
            FilterValue::Int(i) => i.to_string(),
            FilterValue::Uuid(u) => u.to_string(),
            FilterValue::Timestamp(t) => t.to_rfc3339(),
        }
    }

    /// Compare a JSON row value against this operand. `None` when the value
    /// is missing or of a different shape.
    fn compare(&self, value: &Value) -> Option<Ordering> {
        match self {
            FilterValue::Text(s) => Some(value.as_str()?.cmp(s.as_str())),
            FilterValue::Int(i) => Some(value.as_i64()?.cmp(i)),
            FilterValue::Uuid(u) => Some(value.as_str()?.parse::<Uuid>().ok()?.cmp(u)),
            FilterValue::Timestamp(t) => Some(parse_timestamp(value)?.cmp(t)),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<Uuid> for FilterValue {
    fn from(v: Uuid) -> Self {
        FilterValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(v: DateTime<Utc>) -> Self {
        FilterValue::Timestamp(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, FilterValue),
    Gte(&'static str, FilterValue),
    Lt(&'static str, FilterValue),
    In(&'static str, Vec<FilterValue>),
}

impl Filter {
    pub fn column(&self) -> &'static str {
        match self {
            Filter::Eq(c, _) | Filter::Gte(c, _) | Filter::Lt(c, _) | Filter::In(c, _) => c,
        }
    }

    fn matches(&self, row: &Value) -> bool {
        let value = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, v) => v.compare(value) == Some(Ordering::Equal),
            Filter::Gte(_, v) => matches!(v.compare(value), Some(Ordering::Greater | Ordering::Equal)),
            Filter::Lt(_, v) => v.compare(value) == Some(Ordering::Less),
            Filter::In(_, vs) => vs.iter().any(|v| v.compare(value) == Some(Ordering::Equal)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

/// Most operands sent in one `IN` filter. 100 quoted UUIDs keep a REST
/// URL well under the common 8 KB request-line limit.
pub const MAX_FILTER_VALUES: usize = 100;

/// Rows requested per page by [`select_all`].
pub const PAGE_SIZE: usize = 1000;

/// Declarative selection: filters are ANDed, then ordered, then offset and
/// limited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &'static str, value: impl Into<FilterValue>) -> Self {
        self.filters.push(Filter::Eq(column, value.into()));
        self
    }

    pub fn gte(mut self, column: &'static str, value: impl Into<FilterValue>) -> Self {
        self.filters.push(Filter::Gte(column, value.into()));
        self
    }

    pub fn lt(mut self, column: &'static str, value: impl Into<FilterValue>) -> Self {
        self.filters.push(Filter::Lt(column, value.into()));
        self
    }

    pub fn any_of<V: Into<FilterValue>>(
        mut self,
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters
            .push(Filter::In(column, values.into_iter().map(Into::into).collect()));
        self
    }

    pub fn order_asc(mut self, column: &'static str) -> Self {
        self.order = Some(Order {
            column,
            descending: false,
        });
        self
    }

    pub fn order_desc(mut self, column: &'static str) -> Self {
        self.order = Some(Order {
            column,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Largest `IN` operand list in this query.
    pub fn widest_in(&self) -> usize {
        self.filters
            .iter()
            .map(|f| match f {
                Filter::In(_, vs) => vs.len(),
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Every column this query names, for backends that splice identifiers.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.filters
            .iter()
            .map(Filter::column)
            .chain(self.order.iter().map(|o| o.column))
    }
}

/// Column names are spliced into SQL and URLs; only plain identifiers pass.
pub fn validate_column(name: &str) -> Result<&str, StoreError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(StoreError::InvalidColumn(name.to_string()))
    }
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

// ============================================================================
// Typed helpers
// ============================================================================

/// Insert a serializable record and decode the stored row back.
pub async fn insert_record<T>(store: &dyn DataStore, table: Table, record: &T) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    let stored = store.insert_one(table, serde_json::to_value(record)?).await?;
    Ok(serde_json::from_value(stored)?)
}

pub async fn insert_records<T: Serialize>(
    store: &dyn DataStore,
    table: Table,
    records: &[T],
) -> Result<(), StoreError> {
    let rows = records
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    store.insert_many(table, rows).await
}

pub async fn select_records<T: DeserializeOwned>(
    store: &dyn DataStore,
    table: Table,
    query: &Query,
) -> Result<Vec<T>, StoreError> {
    store
        .select(table, query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(StoreError::from))
        .collect()
}

pub async fn select_first<T: DeserializeOwned>(
    store: &dyn DataStore,
    table: Table,
    query: Query,
) -> Result<Option<T>, StoreError> {
    let query = query.limit(1);
    Ok(select_records(store, table, &query).await?.into_iter().next())
}

/// Every row matching `query`, fetched [`PAGE_SIZE`] rows at a time. The
/// backend may return fewer rows per page than asked, so paging stops only
/// at an empty page. Give the query an order on a unique column so pages
/// do not overlap.
pub async fn select_all<T: DeserializeOwned>(
    store: &dyn DataStore,
    table: Table,
    query: &Query,
) -> Result<Vec<T>, StoreError> {
    let mut records = Vec::new();
    loop {
        let page = query.clone().limit(PAGE_SIZE).offset(records.len());
        let rows: Vec<T> = select_records(store, table, &page).await?;
        if rows.is_empty() {
            return Ok(records);
        }
        records.extend(rows);
    }
}

/// [`select_all`] over `base` plus `column IN values`, one request chain per
/// [`MAX_FILTER_VALUES`] chunk. No values selects nothing.
pub async fn select_any_of<T, V>(
    store: &dyn DataStore,
    table: Table,
    base: &Query,
    column: &'static str,
    values: Vec<V>,
) -> Result<Vec<T>, StoreError>
where
    T: DeserializeOwned,
    V: Into<FilterValue> + Clone,
{
    let mut records = Vec::new();
    for chunk in values.chunks(MAX_FILTER_VALUES) {
        let query = base.clone().any_of(column, chunk.iter().cloned());
        records.extend(select_all(store, table, &query).await?);
    }
    Ok(records)
}

/// Count of rows matching `base` plus `column IN values`, summed over
/// [`MAX_FILTER_VALUES`] chunks.
pub async fn count_any_of<V>(
    store: &dyn DataStore,
    table: Table,
    base: &Query,
    column: &'static str,
    values: Vec<V>,
) -> Result<u64, StoreError>
where
    V: Into<FilterValue> + Clone,
{
    let mut total = 0;
    for chunk in values.chunks(MAX_FILTER_VALUES) {
        let query = base.clone().any_of(column, chunk.iter().cloned());
        total += store.count(table, &query).await?;
    }
    Ok(total)
}

// ============================================================================
// Factory
// ============================================================================

/// Create the configured backend. Missing URL/key for the selected backend
/// fails here.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn DataStore>, StoreError> {
    match config.backend.as_str() {
        "postgrest" => Ok(Arc::new(crate::postgrest::PostgrestStore::new(config)?)),
        "postgres" => Ok(Arc::new(crate::db::PgStore::connect(config).await?)),
        "memory" => Ok(Arc::new(MemoryStore::new())),
        other => Err(StoreError::UnknownBackend(other.to_string())),
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
struct MemoryTables {
    rows: HashMap<Table, Vec<Value>>,
    insert_attempts: HashMap<Table, usize>,
    failing_inserts: HashSet<Table>,
    failing_selects: HashSet<Table>,
    max_rows: Option<usize>,
    max_filter_values: Option<usize>,
}

impl MemoryTables {
    fn check_read(&self, table: Table, query: &Query) -> Result<(), StoreError> {
        if self.failing_selects.contains(&table) {
            return Err(StoreError::Injected(table.as_str()));
        }
        match self.max_filter_values {
            Some(max) if query.widest_in() > max => Err(StoreError::Api {
                code: 414,
                message: format!("IN list of {} values exceeds {}", query.widest_in(), max),
            }),
            _ => Ok(()),
        }
    }

    fn matching<'a>(&'a self, table: Table, query: &'a Query) -> impl Iterator<Item = &'a Value> + 'a {
        self.rows
            .get(&table)
            .into_iter()
            .flatten()
            .filter(|row| query.filters.iter().all(|f| f.matches(row)))
    }
}

/// In-process tables. Inserts are counted per table and individual tables
/// can be made to fail, so callers can observe which writes were attempted.
/// Response and filter caps can be set to behave like a hosted store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert into `table` fail.
    pub async fn fail_inserts_into(&self, table: Table) {
        self.tables.write().await.failing_inserts.insert(table);
    }

    /// Make every subsequent select from `table` fail.
    pub async fn fail_selects_from(&self, table: Table) {
        self.tables.write().await.failing_selects.insert(table);
    }

    /// Return at most `max` rows per select, like a server-side row cap.
    pub async fn limit_response_rows(&self, max: usize) {
        self.tables.write().await.max_rows = Some(max);
    }

    /// Reject selects and counts whose `IN` list is longer than `max`, like
    /// a server refusing an oversized request line.
    pub async fn limit_filter_values(&self, max: usize) {
        self.tables.write().await.max_filter_values = Some(max);
    }

    /// Number of insert calls made against `table`, successful or not.
    pub async fn insert_attempts(&self, table: Table) -> usize {
        self.tables
            .read()
            .await
            .insert_attempts
            .get(&table)
            .copied()
            .unwrap_or(0)
    }

    pub async fn rows(&self, table: Table) -> Vec<Value> {
        self.tables
            .read()
            .await
            .rows
            .get(&table)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed rows without counting them as inserts.
    pub async fn seed<T: Serialize>(&self, table: Table, records: &[T]) -> Result<(), StoreError> {
        let mut rows = records
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        self.tables
            .write()
            .await
            .rows
            .entry(table)
            .or_default()
            .append(&mut rows);
        Ok(())
    }

    fn begin_insert(tables: &mut MemoryTables, table: Table) -> Result<(), StoreError> {
        *tables.insert_attempts.entry(table).or_default() += 1;
        if tables.failing_inserts.contains(&table) {
            return Err(StoreError::Injected(table.as_str()));
        }
        Ok(())
    }
}

fn compare_json(a: &Value, b: &Value) -> Ordering {
    if let (Some(ta), Some(tb)) = (parse_timestamp(a), parse_timestamp(b)) {
        return ta.cmp(&tb);
    }
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn insert_one(&self, table: Table, row: Value) -> Result<Value, StoreError> {
        let mut tables = self.tables.write().await;
        Self::begin_insert(&mut tables, table)?;
        tables.rows.entry(table).or_default().push(row.clone());
        Ok(row)
    }

    async fn insert_many(&self, table: Table, mut rows: Vec<Value>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        Self::begin_insert(&mut tables, table)?;
        tables.rows.entry(table).or_default().append(&mut rows);
        Ok(())
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, StoreError> {
        let tables = self.tables.read().await;
        tables.check_read(table, query)?;

        let mut rows: Vec<Value> = tables.matching(table, query).cloned().collect();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let ord = compare_json(
                    a.get(order.column).unwrap_or(&Value::Null),
                    b.get(order.column).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }

        let rows = rows.into_iter().skip(query.offset.unwrap_or(0));
        let cap = match (query.limit, tables.max_rows) {
            (Some(limit), Some(max)) => limit.min(max),
            (limit, max) => limit.or(max).unwrap_or(usize::MAX),
        };
        Ok(rows.take(cap).collect())
    }

    async fn count(&self, table: Table, query: &Query) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        tables.check_read(table, query)?;
        Ok(tables.matching(table, query).count() as u64)
    }

    async fn health_check(&self) -> Result<String, StoreError> {
        Ok("memory".to_string())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// TESTS
// ============================================================================
