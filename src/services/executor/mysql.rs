// MySQL Executor
// Purpose: Implement QueryExecutor over a mysql_async pool

use super::{QueryExecutor, QueryResult};
use crate::models::Dialect;
use crate::utils::error::{DossierError, DossierResult};
use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::Pool;
use std::sync::Arc;
use std::time::Instant;

pub struct MySqlExecutor {
    pool: Arc<Pool>,
}

impl MySqlExecutor {
    pub fn connect(url: &str) -> DossierResult<Self> {
        let opts = mysql_async::Opts::from_url(url)
            .map_err(|e| DossierError::config(format!("invalid mysql url: {}", e)))?;
        Ok(Self { pool: Arc::new(Pool::new(opts)) })
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn execute(&self, sql: &str) -> DossierResult<QueryResult> {
        let mut conn = self.pool.get_conn().await.map_err(|e| {
            tracing::error!("failed to get connection from pool: {}", e);
            DossierError::query(sql, format!("failed to get connection: {}", e))
        })?;

        let start = Instant::now();
        let rows: Vec<mysql_async::Row> = conn.query(sql).await.map_err(|e| {
            tracing::debug!("mysql query failed: {} (sql: {})", e, sql);
            DossierError::query(sql, e.to_string())
        })?;
        let latency_ms = start.elapsed().as_millis();

        drop(conn);

        tracing::debug!("mysql: '{}' -> {} rows in {}ms", sql, rows.len(), latency_ms);
        Ok(process_query_result(rows, latency_ms))
    }
}

fn process_query_result(rows: Vec<mysql_async::Row>, latency_ms: u128) -> QueryResult {
    let mut result = QueryResult { latency_ms, ..Default::default() };
    let Some(first) = rows.first() else {
        return result;
    };

    result.columns = first.columns_ref().iter().map(|c| c.name_str().to_string()).collect();
    let col_count = result.columns.len();

    for row in rows.iter() {
        let mut row_data = Vec::with_capacity(col_count);
        for col_idx in 0..col_count {
            row_data.push(value_to_json(&row[col_idx]));
        }
        result.rows.push(row_data);
    }
    result.row_count = result.rows.len();
    result
}

/// Convert a mysql value to JSON, keeping numeric types numeric
fn value_to_json(value: &mysql_async::Value) -> serde_json::Value {
    match value {
        mysql_async::Value::NULL => serde_json::Value::Null,
        mysql_async::Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(s) => serde_json::Value::String(s.to_string()),
            Err(_) => serde_json::Value::String(String::from_utf8_lossy(bytes).to_string()),
        },
        mysql_async::Value::Int(i) => serde_json::Value::from(*i),
        mysql_async::Value::UInt(u) => serde_json::Value::from(*u),
        mysql_async::Value::Float(f) => serde_json::Number::from_f64(*f as f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        mysql_async::Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        mysql_async::Value::Date(year, month, day, hour, minute, second, _micro) => {
            serde_json::Value::String(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        }
        mysql_async::Value::Time(_neg, days, hours, minutes, seconds, _micro) => {
            let total_hours = days * 24 + (*hours as u32);
            serde_json::Value::String(format!("{}:{:02}:{:02}", total_hours, minutes, seconds))
        }
    }
}
