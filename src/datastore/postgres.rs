//! PostgreSQL store driver over a shared `sqlx` pool.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{ConnectOptions, PgPool};

use super::{Filters, Row, StoreDriver, StoreError};
use crate::sql::{self, PgBindValue, QueryBuf};

/// Pooled connection handle; clones share the pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run a `CREATE TABLE IF NOT EXISTS ...` statement for an entity table.
    pub async fn ensure_table(&self, ddl: &str) -> Result<(), StoreError> {
        sqlx::query(ddl).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn query_many(&self, q: &QueryBuf) -> Result<Vec<Row>, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, q: &QueryBuf) -> Result<u64, StoreError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }
}

#[async_trait]
impl StoreDriver for PgStore {
    async fn count(&self, table: &str, filters: &Filters) -> Result<u64, StoreError> {
        let q = sql::select_count(table, filters);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query_scalar::<_, i64>(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from(p));
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn select(
        &self,
        table: &str,
        filters: &Filters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Row>, StoreError> {
        self.query_many(&sql::select_list(table, filters, limit, offset)).await
    }

    async fn select_by_id(&self, table: &str, id: i64) -> Result<Row, StoreError> {
        let q = sql::select_by_id(table, id);
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        // RowNotFound converts to StoreError::NotFound; anything else stays a database error.
        let row = sqlx::query(&q.sql).bind(id).fetch_one(&self.pool).await?;
        Ok(row_to_json(&row))
    }

    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError> {
        let mut rows = self.query_many(&sql::insert(table, &row)).await?;
        rows.pop()
            .ok_or_else(|| StoreError::Backend(format!("insert into {table} returned no row")))
    }

    async fn update(&self, table: &str, id: i64, row: Row) -> Result<u64, StoreError> {
        self.execute(&sql::update(table, id, &row)).await
    }

    async fn delete(&self, table: &str, id: i64) -> Result<u64, StoreError> {
        self.execute(&sql::delete(table, id)).await
    }
}

/// Connect to `database_url`, creating the database first if needed. Retries
/// with a fixed delay; `attempts == 0` retries until it succeeds.
pub async fn connect_with_retry(
    database_url: &str,
    max_connections: u32,
    delay: Duration,
    attempts: u32,
) -> Result<PgPool, StoreError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let result = match ensure_database_exists(database_url).await {
            Ok(()) => PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(database_url)
                .await
                .map_err(StoreError::from),
            Err(err) => Err(err),
        };
        match result {
            Ok(pool) => return Ok(pool),
            Err(err) if attempts == 0 || attempt < attempts => {
                tracing::warn!(error = %err, attempt, retry_in = ?delay, "could not connect to database");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = PgConnectOptions::from_str(&admin_url)
        .map_err(|e| StoreError::Backend(format!("invalid DATABASE_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Backend("DATABASE_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    Ok((format!("{}postgres", base), db_name.to_owned()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn row_to_json(row: &PgRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut map = Row::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_owned(), cell_to_value(row, name));
    }
    map
}

fn cell_to_value(row: &PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        return serde_json::Number::from_f64(f64::from(n)).map_or(Value::Null, Value::Number);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(d)) = row.try_get::<Option<DateTime<Utc>>, _>(name) {
        return Value::String(d.to_rfc3339_opts(SecondsFormat::Micros, true));
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
