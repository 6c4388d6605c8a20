// Deterministic Profiler
// Purpose: Pure-SQL quality passes per table - whitespace in join keys,
// numeric values stored as text, orphan foreign-key references, null and
// empty-string analysis, and per-column value statistics.
//
// Everything correctness-critical lives here: the LLM agents only add
// qualitative business notes on top. Running the profiler twice on the
// same snapshot yields identical issues and stats - probe queries carry
// explicit tie-breaks and no randomness.

use crate::models::{
    Column, Dialect, ForeignKey, IssueType, NumericRange, QualityIssue, Severity, SqlOp,
    TableRecord, TopValue, ValueStats,
};
use crate::services::dossier_store::DossierStore;
use crate::services::executor::{value_as_string, QueryExecutor};
use crate::utils::error::{DossierError, DossierResult};
use crate::utils::sql::quote_ident;
use std::sync::Arc;

/// Ratio of numeric-looking values above which a TEXT column is flagged
const TYPE_MISMATCH_RATIO: f64 = 0.8;
/// Minimum populated values before the type-mismatch check applies
const TYPE_MISMATCH_MIN_VALUES: u64 = 5;
/// Null share above which a column is flagged null-heavy
const NULL_HEAVY_PERCENT: f64 = 50.0;
/// Distinct-count ceiling for collecting top values
const TOP_VALUES_MAX_DISTINCT: u64 = 30;
/// Cap on collected top values
const TOP_VALUES_LIMIT: usize = 15;
/// Cap on example literals attached to an issue
const MAX_EXAMPLES: usize = 3;

pub struct Profiler {
    executor: Arc<dyn QueryExecutor>,
}

impl Profiler {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor }
    }

    /// Profile one table: columns first (declared order), then foreign keys.
    ///
    /// Requires the table's basic metadata (row count, columns, foreign
    /// keys) to be populated already. Tables with zero rows are skipped.
    pub async fn profile_table(&self, store: &DossierStore, table: &str) -> DossierResult<()> {
        let record = store
            .get_table_record(table)
            .ok_or_else(|| DossierError::illegal_state(format!("unknown table {}", table)))?;

        if record.row_count == 0 {
            tracing::debug!("profiler: skipping empty table {}", table);
            return Ok(());
        }

        let dialect = self.executor.dialect();
        let mut issues = Vec::new();

        for column in &record.columns {
            if column.is_text_family() {
                if let Some(issue) = self.check_whitespace(dialect, &record, column).await {
                    issues.push(issue);
                }
                if let Some(issue) = self.check_type_mismatch(dialect, &record, column).await {
                    issues.push(issue);
                }
            }

            match self.collect_value_stats(dialect, &record, column).await {
                Some(stats) => {
                    issues.extend(derive_stat_issues(&record, column, &stats));
                    store.set_value_stats(table, &column.name, stats)?;
                }
                None => {
                    tracing::warn!("profiler: value stats unavailable for {}.{}", table, column.name);
                }
            }
        }

        for fk in &record.foreign_keys {
            if let Some(issue) = self.check_orphans(dialect, &record, fk).await {
                issues.push(issue);
            }
        }

        store.set_quality_issues(table, issues)?;
        Ok(())
    }

    /// Fire one probe, downgrading failures to a logged skip
    async fn probe(&self, sql: &str) -> Option<crate::services::executor::QueryResult> {
        match self.executor.execute(sql).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("profiler probe failed: {}", e);
                None
            }
        }
    }

    async fn check_whitespace(
        &self,
        dialect: Dialect,
        record: &TableRecord,
        column: &Column,
    ) -> Option<QualityIssue> {
        let t = quote_ident(dialect, &record.name);
        let c = quote_ident(dialect, &column.name);
        let sql = format!(
            "SELECT {c} FROM {t} WHERE {c} IS NOT NULL AND {c} != TRIM({c}) LIMIT 5"
        );
        let result = self.probe(&sql).await?;
        if result.rows.is_empty() {
            return None;
        }

        let examples: Vec<String> = result
            .rows
            .iter()
            .take(MAX_EXAMPLES)
            .filter_map(|row| row.first().map(value_as_string))
            .collect();

        Some(QualityIssue {
            table: record.name.clone(),
            column: column.name.clone(),
            issue_type: IssueType::Whitespace,
            severity: Severity::Critical,
            description: format!(
                "Column {} contains values with leading or trailing whitespace; equality comparisons and joins on the raw value will miss rows",
                column.name
            ),
            sql_fix: format!("TRIM({c})"),
            affected_ops: vec![SqlOp::Join, SqlOp::Where, SqlOp::GroupBy],
            examples,
        })
    }

    async fn check_type_mismatch(
        &self,
        dialect: Dialect,
        record: &TableRecord,
        column: &Column,
    ) -> Option<QualityIssue> {
        let t = quote_ident(dialect, &record.name);
        let c = quote_ident(dialect, &column.name);

        let non_empty_sql = format!(
            "SELECT COUNT(*) FROM {t} WHERE {c} IS NOT NULL AND TRIM({c}) != ''"
        );
        let non_empty = self.probe(&non_empty_sql).await?.scalar_u64()?;
        if non_empty < TYPE_MISMATCH_MIN_VALUES {
            return None;
        }

        let numeric_sql = numeric_like_count_sql(dialect, &t, &c);
        let numeric = self.probe(&numeric_sql).await?.scalar_u64()?;

        let ratio = numeric as f64 / non_empty as f64;
        if ratio < TYPE_MISMATCH_RATIO {
            return None;
        }

        Some(QualityIssue {
            table: record.name.clone(),
            column: column.name.clone(),
            issue_type: IssueType::TypeMismatch,
            severity: Severity::Critical,
            description: format!(
                "Column {} is declared {} but {:.0}% of its values look numeric; comparisons and sorting operate on text",
                column.name,
                column.data_type,
                ratio * 100.0
            ),
            sql_fix: format!("CAST({c} AS INTEGER)"),
            affected_ops: vec![SqlOp::Where, SqlOp::OrderBy, SqlOp::GroupBy, SqlOp::Having],
            examples: Vec::new(),
        })
    }

    async fn collect_value_stats(
        &self,
        dialect: Dialect,
        record: &TableRecord,
        column: &Column,
    ) -> Option<ValueStats> {
        let t = quote_ident(dialect, &record.name);
        let c = quote_ident(dialect, &column.name);

        let base_sql = format!(
            "SELECT COUNT(*) AS total, COUNT({c}) AS non_null, COUNT(DISTINCT {c}) AS distinct_cnt FROM {t}"
        );
        let base = self.probe(&base_sql).await?;
        let total = base.value(0, "total").and_then(crate::services::executor::value_as_u64)?;
        let non_null =
            base.value(0, "non_null").and_then(crate::services::executor::value_as_u64)?;
        let distinct_count =
            base.value(0, "distinct_cnt").and_then(crate::services::executor::value_as_u64)?;

        let null_count = total.saturating_sub(non_null);
        let null_percent =
            if total > 0 { null_count as f64 / total as f64 * 100.0 } else { 0.0 };

        let mut stats = ValueStats {
            distinct_count,
            null_count,
            null_percent,
            empty_count: None,
            top_values: None,
            range: None,
        };

        if column.is_text_family() {
            let empty_sql = format!("SELECT COUNT(*) FROM {t} WHERE {c} = ''");
            stats.empty_count = self.probe(&empty_sql).await.and_then(|r| r.scalar_u64());
        }

        if (1..=TOP_VALUES_MAX_DISTINCT).contains(&distinct_count) {
            let top_sql = format!(
                "SELECT {c} AS value, COUNT(*) AS cnt FROM {t} WHERE {c} IS NOT NULL GROUP BY {c} ORDER BY cnt DESC, value ASC LIMIT {TOP_VALUES_LIMIT}"
            );
            if let Some(result) = self.probe(&top_sql).await {
                let top: Vec<TopValue> = (0..result.rows.len())
                    .filter_map(|row| {
                        let count = result
                            .value(row, "cnt")
                            .and_then(crate::services::executor::value_as_u64)?;
                        Some(TopValue {
                            value: result.value(row, "value").map(value_as_string)?,
                            count,
                            percent: if total > 0 {
                                count as f64 / total as f64 * 100.0
                            } else {
                                0.0
                            },
                        })
                    })
                    .collect();
                if !top.is_empty() {
                    stats.top_values = Some(top);
                }
            }
        }

        if column.is_numeric_family() {
            let range_sql = format!(
                "SELECT MIN({c}) AS min_v, MAX({c}) AS max_v, AVG({c}) AS avg_v FROM {t} WHERE {c} IS NOT NULL"
            );
            if let Some(result) = self.probe(&range_sql).await {
                let min = result.value(0, "min_v").and_then(crate::services::executor::value_as_f64);
                let max = result.value(0, "max_v").and_then(crate::services::executor::value_as_f64);
                let avg = result.value(0, "avg_v").and_then(crate::services::executor::value_as_f64);
                if let (Some(min), Some(max), Some(avg)) = (min, max, avg) {
                    stats.range = Some(NumericRange { min, max, avg });
                }
            }
        }

        Some(stats)
    }

    async fn check_orphans(
        &self,
        dialect: Dialect,
        record: &TableRecord,
        fk: &ForeignKey,
    ) -> Option<QualityIssue> {
        if fk.ref_column.is_empty() {
            tracing::warn!(
                "profiler: foreign key {}.{} has no resolved referenced column, skipping orphan check",
                record.name,
                fk.column
            );
            return None;
        }

        let child = quote_ident(dialect, &record.name);
        let parent = quote_ident(dialect, &fk.ref_table);
        let fk_col = quote_ident(dialect, &fk.column);
        let ref_col = quote_ident(dialect, &fk.ref_column);

        // aliases keep self-referencing foreign keys unambiguous
        let sql = format!(
            "SELECT COUNT(*) FROM {child} AS child LEFT JOIN {parent} AS parent ON child.{fk_col} = parent.{ref_col} WHERE parent.{ref_col} IS NULL AND child.{fk_col} IS NOT NULL"
        );
        let orphans = self.probe(&sql).await?.scalar_u64()?;
        if orphans == 0 {
            return None;
        }

        Some(QualityIssue {
            table: record.name.clone(),
            column: fk.column.clone(),
            issue_type: IssueType::Orphan,
            severity: Severity::Warning,
            description: format!(
                "{} rows in {} reference {}.{} values that do not exist; an INNER JOIN silently drops them",
                orphans, record.name, fk.ref_table, fk.ref_column
            ),
            sql_fix: format!(
                "LEFT JOIN {parent} ON {child}.{fk_col} = {parent}.{ref_col}"
            ),
            affected_ops: vec![SqlOp::Join],
            examples: Vec::new(),
        })
    }
}

/// Issues derived from already-computed statistics
fn derive_stat_issues(record: &TableRecord, column: &Column, stats: &ValueStats) -> Vec<QualityIssue> {
    let mut issues = Vec::new();

    if stats.null_percent > NULL_HEAVY_PERCENT {
        issues.push(QualityIssue {
            table: record.name.clone(),
            column: column.name.clone(),
            issue_type: IssueType::NullHeavy,
            severity: Severity::Warning,
            description: format!(
                "Column {} is {:.1}% NULL ({} of {} rows)",
                column.name, stats.null_percent, stats.null_count, record.row_count
            ),
            sql_fix: format!("{} IS NOT NULL", column.name),
            affected_ops: vec![SqlOp::Where],
            examples: Vec::new(),
        });
    }

    if column.is_text_family() {
        if let Some(empty) = stats.empty_count.filter(|&n| n > 0) {
            issues.push(QualityIssue {
                table: record.name.clone(),
                column: column.name.clone(),
                issue_type: IssueType::EmptyString,
                severity: Severity::Warning,
                description: format!(
                    "Column {} contains {} empty-string values distinct from NULL",
                    column.name, empty
                ),
                sql_fix: format!("NULLIF({}, '')", column.name),
                affected_ops: vec![SqlOp::Where, SqlOp::GroupBy],
                examples: Vec::new(),
            });
        }
    }

    issues
}

/// Count of values matching the dialect's "looks numeric" pattern.
///
/// SQLite has no REGEXP by default, so the check excludes ASCII letters and
/// requires at least one digit via GLOB; MySQL and Postgres anchor a real
/// numeric pattern.
fn numeric_like_count_sql(dialect: Dialect, quoted_table: &str, quoted_col: &str) -> String {
    match dialect {
        Dialect::Sqlite => format!(
            "SELECT COUNT(*) FROM {quoted_table} WHERE {quoted_col} IS NOT NULL AND TRIM({quoted_col}) != '' AND TRIM({quoted_col}) NOT GLOB '*[A-Za-z]*' AND TRIM({quoted_col}) GLOB '*[0-9]*'"
        ),
        Dialect::MySql => format!(
            "SELECT COUNT(*) FROM {quoted_table} WHERE {quoted_col} IS NOT NULL AND TRIM({quoted_col}) != '' AND TRIM({quoted_col}) REGEXP '^[+-]?[0-9]+(\\\\.[0-9]+)?$'"
        ),
        Dialect::Postgres => format!(
            "SELECT COUNT(*) FROM {quoted_table} WHERE {quoted_col} IS NOT NULL AND TRIM({quoted_col}) != '' AND TRIM({quoted_col}) ~ '^[+-]?[0-9]+(\\.[0-9]+)?$'"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::executor::SqliteExecutor;

    async fn fixture(statements: &[&str]) -> (Arc<dyn QueryExecutor>, DossierStore) {
        let exec = SqliteExecutor::in_memory().await.unwrap();
        for stmt in statements {
            exec.execute(stmt).await.unwrap();
        }
        let exec: Arc<dyn QueryExecutor> = Arc::new(exec);
        let store = DossierStore::new("testdb", Dialect::Sqlite);
        (exec, store)
    }

    async fn load_metadata(exec: &Arc<dyn QueryExecutor>, store: &DossierStore, table: &str) {
        let dialect = Dialect::Sqlite;
        store.ensure_table(table);
        for sql in [
            dialect.columns_sql(table),
            dialect.row_count_sql(table),
            dialect.foreign_keys_sql(table),
        ] {
            if let Ok(result) = exec.execute(&sql).await {
                if let Some(kind) = crate::services::dossier_store::classify_probe(&sql) {
                    store.put_temp(kind.key(table), result);
                }
            }
        }
        store.build_table_metadata(table, dialect, None).unwrap();
    }

    #[tokio::test]
    async fn detects_whitespace_and_orphans_and_range() {
        let (exec, store) = fixture(&[
            "CREATE TABLE singer (id INTEGER PRIMARY KEY, name TEXT, age INT)",
            "CREATE TABLE concert (id INTEGER PRIMARY KEY, singer_id INTEGER REFERENCES singer(id))",
            "INSERT INTO singer VALUES (1, 'Adele', 34), (2, ' Beyoncé ', 41)",
            "INSERT INTO concert VALUES (1, 1), (2, 99)",
        ])
        .await;
        load_metadata(&exec, &store, "singer").await;
        load_metadata(&exec, &store, "concert").await;

        let profiler = Profiler::new(exec);
        profiler.profile_table(&store, "singer").await.unwrap();
        profiler.profile_table(&store, "concert").await.unwrap();

        let singer = store.get_table_record("singer").unwrap();
        let ws: Vec<_> = singer
            .quality_issues
            .iter()
            .filter(|i| i.issue_type == IssueType::Whitespace)
            .collect();
        assert_eq!(ws.len(), 1);
        assert_eq!(ws[0].column, "name");
        assert_eq!(ws[0].severity, Severity::Critical);
        assert_eq!(ws[0].examples, vec![" Beyoncé "]);
        assert!(ws[0].affected_ops.contains(&SqlOp::Join));

        let age = singer.column("age").unwrap();
        let range = age.value_stats.as_ref().unwrap().range.as_ref().unwrap();
        assert_eq!(range.min, 34.0);
        assert_eq!(range.max, 41.0);
        assert!((range.avg - 37.5).abs() < 1e-9);

        let concert = store.get_table_record("concert").unwrap();
        let orphans: Vec<_> = concert
            .quality_issues
            .iter()
            .filter(|i| i.issue_type == IssueType::Orphan)
            .collect();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].column, "singer_id");
        assert!(orphans[0].sql_fix.starts_with("LEFT JOIN"));
    }

    #[tokio::test]
    async fn flags_numeric_text_with_top_values() {
        let (exec, store) = fixture(&[
            "CREATE TABLE cars (id INTEGER PRIMARY KEY, horsepower TEXT)",
            "INSERT INTO cars (horsepower) VALUES ('100'), ('150'), ('200'), ('90'), ('175')",
        ])
        .await;
        load_metadata(&exec, &store, "cars").await;

        Profiler::new(exec).profile_table(&store, "cars").await.unwrap();

        let cars = store.get_table_record("cars").unwrap();
        let mismatch: Vec<_> = cars
            .quality_issues
            .iter()
            .filter(|i| i.issue_type == IssueType::TypeMismatch)
            .collect();
        assert_eq!(mismatch.len(), 1);
        assert_eq!(mismatch[0].sql_fix, "CAST(\"horsepower\" AS INTEGER)");

        let stats = cars.column("horsepower").unwrap().value_stats.as_ref().unwrap();
        assert_eq!(stats.distinct_count, 5);
        let top = stats.top_values.as_ref().unwrap();
        assert_eq!(top.len(), 5);
        // ties broken by value, descending by count first
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[tokio::test]
    async fn null_heavy_and_empty_string_warnings() {
        let mut statements = vec![
            "CREATE TABLE t (id INTEGER PRIMARY KEY, label TEXT)".to_string(),
        ];
        // 50 empty strings, 20 NULLs, 930 populated -> 1000 rows
        for i in 0..1000 {
            let value = if i < 50 {
                "''".to_string()
            } else if i < 70 {
                "NULL".to_string()
            } else {
                format!("'v{}'", i)
            };
            statements.push(format!("INSERT INTO t (label) VALUES ({})", value));
        }
        let refs: Vec<&str> = statements.iter().map(|s| s.as_str()).collect();
        let (exec, store) = fixture(&refs).await;
        load_metadata(&exec, &store, "t").await;

        Profiler::new(exec).profile_table(&store, "t").await.unwrap();

        let t = store.get_table_record("t").unwrap();
        let stats = t.column("label").unwrap().value_stats.as_ref().unwrap();
        assert_eq!(stats.null_count, 20);
        assert_eq!(stats.empty_count, Some(50));
        assert!(stats.top_values.is_none());

        let empties: Vec<_> = t
            .quality_issues
            .iter()
            .filter(|i| i.issue_type == IssueType::EmptyString)
            .collect();
        assert_eq!(empties.len(), 1);
        assert_eq!(empties[0].severity, Severity::Warning);
    }

    #[tokio::test]
    async fn all_null_column_is_null_heavy_without_top_values() {
        let (exec, store) = fixture(&[
            "CREATE TABLE t (id INTEGER PRIMARY KEY, gone TEXT)",
            "INSERT INTO t (gone) VALUES (NULL), (NULL), (NULL)",
        ])
        .await;
        load_metadata(&exec, &store, "t").await;

        Profiler::new(exec).profile_table(&store, "t").await.unwrap();

        let t = store.get_table_record("t").unwrap();
        let issues: Vec<_> =
            t.quality_issues.iter().filter(|i| i.column == "gone").collect();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].issue_type, IssueType::NullHeavy);

        let stats = t.column("gone").unwrap().value_stats.as_ref().unwrap();
        assert_eq!(stats.null_percent, 100.0);
        assert!(stats.top_values.is_none());
    }

    #[tokio::test]
    async fn empty_table_is_skipped_entirely() {
        let (exec, store) = fixture(&["CREATE TABLE empty_t (id INTEGER, label TEXT)"]).await;
        load_metadata(&exec, &store, "empty_t").await;

        Profiler::new(exec).profile_table(&store, "empty_t").await.unwrap();

        let t = store.get_table_record("empty_t").unwrap();
        assert!(t.quality_issues.is_empty());
        assert!(t.columns.iter().all(|c| c.value_stats.is_none()));
    }

    #[tokio::test]
    async fn thirty_one_distinct_values_suppress_top_values() {
        let mut statements =
            vec!["CREATE TABLE t (id INTEGER PRIMARY KEY, code TEXT)".to_string()];
        for i in 0..31 {
            statements.push(format!("INSERT INTO t (code) VALUES ('c{:02}')", i));
        }
        let refs: Vec<&str> = statements.iter().map(|s| s.as_str()).collect();
        let (exec, store) = fixture(&refs).await;
        load_metadata(&exec, &store, "t").await;

        Profiler::new(exec).profile_table(&store, "t").await.unwrap();

        let stats = store
            .get_table_record("t")
            .unwrap()
            .column("code")
            .unwrap()
            .value_stats
            .clone()
            .unwrap();
        assert_eq!(stats.distinct_count, 31);
        assert!(stats.top_values.is_none());
    }

    #[tokio::test]
    async fn profiler_is_deterministic_across_runs() {
        let (exec, store) = fixture(&[
            "CREATE TABLE s (id INTEGER PRIMARY KEY, status TEXT)",
            "INSERT INTO s (status) VALUES ('A'), ('B'), ('A'), (' C'), (NULL)",
        ])
        .await;
        load_metadata(&exec, &store, "s").await;

        let profiler = Profiler::new(exec);
        profiler.profile_table(&store, "s").await.unwrap();
        let first = serde_json::to_string(&store.get_table_record("s").unwrap()).unwrap();

        profiler.profile_table(&store, "s").await.unwrap();
        let second = serde_json::to_string(&store.get_table_record("s").unwrap()).unwrap();

        assert_eq!(first, second);
    }
}
