//! Direct Postgres backend for [`DataStore`].
//!
//! Rows are written from their JSON form through `jsonb_populate_record`, so
//! only the keys present in the row are inserted and column defaults apply
//! to the rest. Selects return `to_jsonb(t)`; filter operands are bound with
//! their native types.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::{PgPool, QueryBuilder};

use crate::config::{required, StoreConfig};
use crate::store::{validate_column, DataStore, Filter, FilterValue, Query, StoreError, Table};

pub async fn create_pool(config: &StoreConfig) -> Result<PgPool, StoreError> {
    let url = required(&config.url).ok_or(StoreError::MissingConfig("store.url"))?;
    Ok(PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.timeout_secs))
        .connect(url)
        .await?)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pool: create_pool(config).await?,
        })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Column list taken from the keys of a JSON object row.
fn row_columns(row: &Value) -> Result<Vec<String>, StoreError> {
    let object = row
        .as_object()
        .ok_or_else(|| StoreError::InvalidColumn("<row is not an object>".to_string()))?;
    object
        .keys()
        .map(|k| validate_column(k).map(str::to_string))
        .collect()
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &FilterValue) {
    match value {
        FilterValue::Text(s) => qb.push_bind(s.clone()),
        FilterValue::Int(i) => qb.push_bind(*i),
        FilterValue::Uuid(u) => qb.push_bind(*u),
        FilterValue::Timestamp(t) => qb.push_bind(*t),
    };
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    for (i, filter) in query.filters.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match filter {
            Filter::Eq(c, v) => {
                qb.push(format!("t.{} = ", c));
                push_value(qb, v);
            }
            Filter::Gte(c, v) => {
                qb.push(format!("t.{} >= ", c));
                push_value(qb, v);
            }
            Filter::Lt(c, v) => {
                qb.push(format!("t.{} < ", c));
                push_value(qb, v);
            }
            Filter::In(_, vs) if vs.is_empty() => {
                qb.push("FALSE");
            }
            Filter::In(c, vs) => {
                qb.push(format!("t.{} IN (", c));
                for (j, v) in vs.iter().enumerate() {
                    if j > 0 {
                        qb.push(", ");
                    }
                    push_value(qb, v);
                }
                qb.push(")");
            }
        }
    }
}

/// Build `SELECT to_jsonb(t) FROM <table> t WHERE ... ORDER BY ... LIMIT ... OFFSET ...`.
pub fn build_select(table: Table, query: &Query) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    for column in query.columns() {
        validate_column(column)?;
    }

    let mut qb = QueryBuilder::new(format!("SELECT to_jsonb(t) FROM {} t", table.as_str()));
    push_filters(&mut qb, query);
    if let Some(order) = &query.order {
        qb.push(format!(
            " ORDER BY t.{} {}",
            order.column,
            if order.descending { "DESC" } else { "ASC" }
        ));
    }
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
    if let Some(offset) = query.offset {
        qb.push(" OFFSET ");
        qb.push_bind(offset as i64);
    }
    Ok(qb)
}

/// Build `SELECT count(*) FROM <table> t WHERE ...`.
pub fn build_count(table: Table, query: &Query) -> Result<QueryBuilder<'static, Postgres>, StoreError> {
    for column in query.columns() {
        validate_column(column)?;
    }

    let mut qb = QueryBuilder::new(format!("SELECT count(*) FROM {} t", table.as_str()));
    push_filters(&mut qb, query);
    Ok(qb)
}

#[async_trait]
impl DataStore for PgStore {
    async fn insert_one(&self, table: Table, row: Value) -> Result<Value, StoreError> {
        let columns = row_columns(&row)?.join(", ");
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {t} AS t ({c}) SELECT {c} FROM jsonb_populate_record(NULL::{t}, ",
            t = table.as_str(),
            c = columns
        ));
        qb.push_bind(row);
        qb.push(") RETURNING to_jsonb(t)");

        let stored = qb.build_query_as::<(Value,)>().fetch_one(&self.pool).await?;
        Ok(stored.0)
    }

    async fn insert_many(&self, table: Table, rows: Vec<Value>) -> Result<(), StoreError> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let columns = row_columns(first)?.join(", ");
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO {t} ({c}) SELECT {c} FROM jsonb_populate_recordset(NULL::{t}, ",
            t = table.as_str(),
            c = columns
        ));
        qb.push_bind(Value::Array(rows));
        qb.push(")");

        qb.build().execute(&self.pool).await?;
        Ok(())
    }

    async fn select(&self, table: Table, query: &Query) -> Result<Vec<Value>, StoreError> {
        let mut qb = build_select(table, query)?;
        let rows = qb.build_query_as::<(Value,)>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn count(&self, table: Table, query: &Query) -> Result<u64, StoreError> {
        let mut qb = build_count(table, query)?;
        let (count,) = qb.build_query_as::<(i64,)>().fetch_one(&self.pool).await?;
        Ok(count.max(0) as u64)
    }

    async fn health_check(&self) -> Result<String, StoreError> {
        Ok(health_check(&self.pool).await?)
    }

    fn name(&self) -> &str {
        "postgres"
    }
}

// ============================================================================
// TESTS
// ============================================================================
