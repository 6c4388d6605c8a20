// Query Executor Module
// Purpose: Provide a uniform sync query interface over arbitrary SQL dialects
// Design: Static dispatch via trait object; one executor per target database

mod mysql;
mod sqlite;

pub use mysql::MySqlExecutor;
pub use sqlite::SqliteExecutor;

use crate::models::Dialect;
use crate::utils::error::DossierResult;
use crate::utils::sql::quote_ident;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Result of one query: ordered columns plus row values
///
/// Values are JSON so the rest of the pipeline is dialect-agnostic; NULL
/// maps to `Value::Null`, integers and floats keep their numeric type.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
    pub latency_ms: u128,
}

impl QueryResult {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Value at (row, column name), if both exist
    pub fn value(&self, row: usize, column: &str) -> Option<&serde_json::Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// First value of the first row (for scalar probes like COUNT(*))
    pub fn scalar(&self) -> Option<&serde_json::Value> {
        self.rows.first()?.first()
    }

    pub fn scalar_u64(&self) -> Option<u64> {
        value_as_u64(self.scalar()?)
    }

    pub fn scalar_f64(&self) -> Option<f64> {
        value_as_f64(self.scalar()?)
    }

    /// Compact textual rendering used as a ReAct observation
    pub fn to_observation(&self, max_rows: usize) -> String {
        if self.rows.is_empty() {
            return "(no rows)".to_string();
        }
        let mut out = String::new();
        out.push_str(&self.columns.join(" | "));
        out.push('\n');
        for row in self.rows.iter().take(max_rows) {
            let cells: Vec<String> = row.iter().map(value_as_display).collect();
            out.push_str(&cells.join(" | "));
            out.push('\n');
        }
        if self.rows.len() > max_rows {
            out.push_str(&format!("... ({} rows total)\n", self.rows.len()));
        }
        out
    }
}

/// Render a JSON value the way a SQL shell would
pub fn value_as_display(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn value_as_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_as_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn value_as_string(value: &serde_json::Value) -> String {
    value_as_display(value)
}

/// Uniform query capability over one target database
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Which dialect the target speaks
    fn dialect(&self) -> Dialect;

    /// Run one read-only statement
    ///
    /// Errors come back as `DossierError::Query` and never abort the
    /// pipeline; agent tools turn them into observations.
    async fn execute(&self, sql: &str) -> DossierResult<QueryResult>;
}

/// Open a SQLite file as an executor (factory method)
pub async fn connect_sqlite(path: &Path) -> DossierResult<Arc<dyn QueryExecutor>> {
    Ok(Arc::new(SqliteExecutor::connect_file(path).await?))
}

/// Connect to a MySQL endpoint as an executor (factory method)
pub fn connect_mysql(url: &str) -> DossierResult<Arc<dyn QueryExecutor>> {
    Ok(Arc::new(MySqlExecutor::connect(url)?))
}

// ============================================================================
// Dialect-specific probe SQL
// ============================================================================

impl Dialect {
    /// Query listing user tables from the system catalog
    pub fn discovery_sql(&self) -> String {
        match self {
            Self::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
                    .to_string()
            }
            Self::MySql => "SHOW TABLES".to_string(),
            Self::Postgres => {
                "SELECT table_name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name"
                    .to_string()
            }
        }
    }

    pub fn columns_sql(&self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("PRAGMA table_info({})", quote_ident(*self, table)),
            Self::MySql => format!("DESCRIBE {}", quote_ident(*self, table)),
            Self::Postgres => format!(
                "SELECT column_name, data_type, is_nullable, column_default FROM information_schema.columns WHERE table_name = '{}' ORDER BY ordinal_position",
                crate::utils::sql::escape_literal(table)
            ),
        }
    }

    pub fn indexes_sql(&self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("PRAGMA index_list({})", quote_ident(*self, table)),
            Self::MySql => format!("SHOW INDEX FROM {}", quote_ident(*self, table)),
            Self::Postgres => format!(
                "SELECT indexname, indexdef FROM pg_indexes WHERE tablename = '{}'",
                crate::utils::sql::escape_literal(table)
            ),
        }
    }

    pub fn row_count_sql(&self, table: &str) -> String {
        format!("SELECT COUNT(*) FROM {}", quote_ident(*self, table))
    }

    pub fn foreign_keys_sql(&self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("PRAGMA foreign_key_list({})", quote_ident(*self, table)),
            Self::MySql => format!(
                "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = '{}' AND REFERENCED_TABLE_NAME IS NOT NULL",
                crate::utils::sql::escape_literal(table)
            ),
            Self::Postgres => format!(
                "SELECT kcu.column_name, ccu.table_name AS referenced_table, ccu.column_name AS referenced_column FROM information_schema.table_constraints tc JOIN information_schema.key_column_usage kcu ON tc.constraint_name = kcu.constraint_name JOIN information_schema.constraint_column_usage ccu ON tc.constraint_name = ccu.constraint_name WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_name = '{}'",
                crate::utils::sql::escape_literal(table)
            ),
        }
    }
}

/// Detect a discovery-shaped query (used to auto-register analysis tasks)
pub fn is_discovery_sql(sql: &str) -> bool {
    let lower = sql.to_lowercase();
    lower.contains("sqlite_master")
        || lower.contains("show tables")
        || lower.contains("information_schema.tables")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_predicate_matches_all_dialects() {
        for dialect in [Dialect::Sqlite, Dialect::MySql, Dialect::Postgres] {
            assert!(is_discovery_sql(&dialect.discovery_sql()), "dialect {dialect}");
        }
        assert!(!is_discovery_sql("SELECT COUNT(*) FROM singer"));
    }

    #[test]
    fn probe_sql_quotes_identifiers() {
        assert_eq!(Dialect::Sqlite.columns_sql("singer"), "PRAGMA table_info(\"singer\")");
        assert_eq!(Dialect::MySql.columns_sql("singer"), "DESCRIBE `singer`");
        assert_eq!(Dialect::Sqlite.row_count_sql("odd\"name"), "SELECT COUNT(*) FROM \"odd\"\"name\"");
    }

    #[test]
    fn observation_rendering_truncates() {
        let result = QueryResult {
            columns: vec!["name".into()],
            rows: (0..30).map(|i| vec![serde_json::json!(format!("t{i}"))]).collect(),
            row_count: 30,
            latency_ms: 1,
        };
        let obs = result.to_observation(20);
        assert!(obs.contains("t0"));
        assert!(obs.contains("(30 rows total)"));
        assert!(!obs.contains("t25"));
    }
}
