// SQLite Executor
// Purpose: Implement QueryExecutor over a sqlx SqlitePool with dynamic row decoding

use super::{QueryExecutor, QueryResult};
use crate::models::Dialect;
use crate::utils::error::{DossierError, DossierResult};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::path::Path;
use std::time::Instant;

pub struct SqliteExecutor {
    pool: SqlitePool,
}

impl SqliteExecutor {
    /// Open an on-disk database read-only
    pub async fn connect_file(path: &Path) -> DossierResult<Self> {
        let options = SqliteConnectOptions::new().filename(path).read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                DossierError::config(format!("failed to open sqlite file {}: {}", path.display(), e))
            })?;
        Ok(Self { pool })
    }

    /// In-memory database (writable; used by tests and fixtures)
    ///
    /// Pinned to one connection that never expires: every pooled sqlite
    /// connection opens its own `:memory:` database, so a larger pool
    /// would scatter the fixture across empty databases.
    pub async fn in_memory() -> DossierResult<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DossierError::config(format!("failed to open in-memory sqlite: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str) -> DossierResult<QueryResult> {
        let start = Instant::now();
        let rows: Vec<SqliteRow> = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::debug!("sqlite query failed: {} (sql: {})", e, sql);
                DossierError::query(sql, e.to_string())
            })?;
        let latency_ms = start.elapsed().as_millis();

        let mut result = QueryResult { latency_ms, ..Default::default() };
        if let Some(first) = rows.first() {
            result.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
        }
        for row in &rows {
            result.rows.push(decode_row(sql, row)?);
        }
        result.row_count = result.rows.len();

        tracing::debug!("sqlite: '{}' -> {} rows in {}ms", sql, result.row_count, latency_ms);
        Ok(result)
    }
}

/// Decode one row into JSON values using the engine's per-value type info
fn decode_row(sql: &str, row: &SqliteRow) -> DossierResult<Vec<serde_json::Value>> {
    let mut values = Vec::with_capacity(row.columns().len());
    for idx in 0..row.columns().len() {
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| DossierError::query(sql, e.to_string()))?;
        if raw.is_null() {
            values.push(serde_json::Value::Null);
            continue;
        }
        // SQLite value types are NULL, INTEGER, REAL, TEXT, BLOB
        let value = match raw.type_info().name() {
            "INTEGER" => row
                .try_get::<i64, _>(idx)
                .map(serde_json::Value::from)
                .map_err(|e| DossierError::query(sql, e.to_string()))?,
            "REAL" => row
                .try_get::<f64, _>(idx)
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            "BLOB" => {
                let bytes: Vec<u8> =
                    row.try_get(idx).map_err(|e| DossierError::query(sql, e.to_string()))?;
                serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
            }
            _ => row
                .try_get::<String, _>(idx)
                .map(serde_json::Value::String)
                .map_err(|e| DossierError::query(sql, e.to_string()))?,
        };
        values.push(value);
    }
    Ok(values)
}
