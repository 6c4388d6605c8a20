// Shared Dossier Store
// Purpose: Thread-safe document holding the evolving per-database model.
// The store is the sole source of truth; agents and the profiler mutate it
// only through these methods.
//
// Locking discipline: every mutation takes the exclusive lock exactly once,
// so composite updates (assembling a table record from temp data) are a
// single method call and cannot produce torn writes. Readers get deep
// clones and never see intermediate state.

use crate::models::{
    is_reserved_context_key, BusinessNote, Column, Dialect, Dossier, ForeignKey, Index,
    QualityIssue, TableRecord, TaskInfo, TaskStatus, ValueStats,
};
use crate::services::executor::{value_as_string, value_as_u64, QueryResult};
use crate::utils::error::{DossierError, DossierResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::RwLock;

// ============================================================================
// Temp data keys
// ============================================================================

/// Kinds of raw probe results stashed mid-phase, keyed `{table}{suffix}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempKind {
    Columns,
    Indexes,
    RowCount,
    ForeignKeys,
}

impl TempKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Columns => "_columns",
            Self::Indexes => "_indexes",
            Self::RowCount => "_rowcount",
            Self::ForeignKeys => "_foreignkeys",
        }
    }

    pub fn key(&self, table: &str) -> String {
        format!("{}{}", table, self.suffix())
    }
}

/// Classify a metadata probe by its SQL text.
///
/// Covers the probe shapes of all three dialects; foreign keys are checked
/// before columns because the MySQL/Postgres FK probes also mention column
/// catalogs.
pub fn classify_probe(sql: &str) -> Option<TempKind> {
    let lower = sql.to_lowercase();
    if lower.contains("pragma foreign_key_list")
        || lower.contains("key_column_usage")
        || lower.contains("constraint_column_usage")
    {
        return Some(TempKind::ForeignKeys);
    }
    if lower.contains("pragma table_info")
        || lower.trim_start().starts_with("describe")
        || lower.trim_start().starts_with("show columns")
        || lower.contains("information_schema.columns")
    {
        return Some(TempKind::Columns);
    }
    if lower.contains("pragma index_list")
        || lower.trim_start().starts_with("show index")
        || lower.contains("pg_indexes")
    {
        return Some(TempKind::Indexes);
    }
    if lower.contains("count(") {
        return Some(TempKind::RowCount);
    }
    None
}

// ============================================================================
// Store
// ============================================================================

pub struct DossierStore {
    inner: RwLock<Dossier>,
    tasks: RwLock<BTreeMap<String, TaskInfo>>,
    /// Raw SQL result sets stashed between phases; never serialized
    temp: DashMap<String, QueryResult>,
}

impl DossierStore {
    pub fn new(database: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            inner: RwLock::new(Dossier::new(database, dialect)),
            tasks: RwLock::new(BTreeMap::new()),
            temp: DashMap::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.inner.read().expect("dossier lock poisoned").dialect
    }

    pub fn database(&self) -> String {
        self.inner.read().expect("dossier lock poisoned").database.clone()
    }

    /// Deep copy of the current document
    pub fn snapshot(&self) -> Dossier {
        self.inner.read().expect("dossier lock poisoned").clone()
    }

    // ------------------------------------------------------------------
    // Tables
    // ------------------------------------------------------------------

    /// Idempotent create
    pub fn ensure_table(&self, name: &str) {
        let mut doc = self.inner.write().expect("dossier lock poisoned");
        doc.tables.entry(name.to_string()).or_insert_with(|| TableRecord::new(name));
    }

    /// Merge seed skeletons from the schema parser
    pub fn seed_tables(&self, seeds: Vec<TableRecord>) {
        let mut doc = self.inner.write().expect("dossier lock poisoned");
        for seed in seeds {
            doc.tables.insert(seed.name.clone(), seed);
        }
    }

    pub fn list_tables(&self) -> Vec<String> {
        self.inner.read().expect("dossier lock poisoned").tables.keys().cloned().collect()
    }

    pub fn get_table_record(&self, name: &str) -> Option<TableRecord> {
        self.inner.read().expect("dossier lock poisoned").tables.get(name).cloned()
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub fn register_task(
        &self,
        id: impl Into<String>,
        owner: impl Into<String>,
        description: impl Into<String>,
    ) -> DossierResult<()> {
        let id = id.into();
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        if tasks.contains_key(&id) {
            return Err(DossierError::illegal_state(format!("task {} already registered", id)));
        }
        tasks.insert(id.clone(), TaskInfo::new(id, owner, description));
        Ok(())
    }

    pub fn start_task(&self, id: &str) -> DossierResult<()> {
        self.transition_task(id, TaskStatus::Running, None, None)
    }

    pub fn complete_task(&self, id: &str, result: Option<serde_json::Value>) -> DossierResult<()> {
        self.transition_task(id, TaskStatus::Completed, result, None)
    }

    pub fn fail_task(&self, id: &str, error: impl Into<String>) -> DossierResult<()> {
        self.transition_task(id, TaskStatus::Failed, None, Some(error.into()))
    }

    fn transition_task(
        &self,
        id: &str,
        next: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> DossierResult<()> {
        let mut tasks = self.tasks.write().expect("task lock poisoned");
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| DossierError::illegal_state(format!("unknown task {}", id)))?;
        if !task.status.can_transition_to(next) {
            return Err(DossierError::illegal_state(format!(
                "task {}: illegal transition {} -> {}",
                id,
                task.status.as_str(),
                next.as_str()
            )));
        }
        task.status = next;
        match next {
            TaskStatus::Running => task.started_at = Some(Utc::now()),
            TaskStatus::Completed => {
                task.finished_at = Some(Utc::now());
                task.result = result;
            }
            TaskStatus::Failed => {
                task.finished_at = Some(Utc::now());
                task.error = error;
            }
            TaskStatus::Registered => {}
        }
        Ok(())
    }

    pub fn list_tasks(&self) -> Vec<TaskInfo> {
        self.tasks.read().expect("task lock poisoned").values().cloned().collect()
    }

    pub fn all_tasks_complete(&self) -> bool {
        self.tasks.read().expect("task lock poisoned").values().all(|t| t.status.is_terminal())
    }

    // ------------------------------------------------------------------
    // Field mutations
    // ------------------------------------------------------------------

    pub fn put_column(&self, table: &str, column: Column) -> DossierResult<()> {
        self.with_table(table, |record| {
            match record.columns.iter_mut().find(|c| c.name == column.name) {
                Some(existing) => *existing = column.clone(),
                None => record.columns.push(column.clone()),
            }
            Ok(())
        })
    }

    pub fn put_index(&self, table: &str, index: Index) -> DossierResult<()> {
        self.with_table(table, |record| {
            match record.indexes.iter_mut().find(|i| i.name == index.name) {
                Some(existing) => *existing = index.clone(),
                None => record.indexes.push(index.clone()),
            }
            Ok(())
        })
    }

    pub fn put_foreign_key(&self, table: &str, fk: ForeignKey) -> DossierResult<()> {
        {
            // referenced table must exist for the finished document
            let mut doc = self.inner.write().expect("dossier lock poisoned");
            doc.tables
                .entry(fk.ref_table.clone())
                .or_insert_with(|| TableRecord::new(fk.ref_table.clone()));
        }
        self.with_table(table, |record| {
            if !record.foreign_keys.contains(&fk) {
                record.foreign_keys.push(fk.clone());
            }
            Ok(())
        })
    }

    pub fn set_row_count(&self, table: &str, row_count: u64) -> DossierResult<()> {
        self.with_table(table, |record| {
            record.row_count = row_count;
            Ok(())
        })
    }

    pub fn set_description(&self, table: &str, description: impl Into<String>) -> DossierResult<()> {
        let description = description.into();
        self.with_table(table, |record| {
            record.description = Some(description.clone());
            Ok(())
        })
    }

    pub fn set_rich_context_entry(
        &self,
        table: &str,
        key: &str,
        content: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> DossierResult<()> {
        if is_reserved_context_key(key) {
            return Err(DossierError::illegal_state(format!(
                "rich context key '{}' collides with reserved metadata suffixes",
                key
            )));
        }
        let note = BusinessNote { content: content.into(), expires_at };
        self.with_table(table, |record| {
            record.rich_context.insert(key.to_string(), note.clone());
            Ok(())
        })
    }

    pub fn set_quality_issues(&self, table: &str, issues: Vec<QualityIssue>) -> DossierResult<()> {
        self.with_table(table, |record| {
            record.quality_issues = issues.clone();
            Ok(())
        })
    }

    pub fn set_value_stats(&self, table: &str, column: &str, stats: ValueStats) -> DossierResult<()> {
        let column = column.to_string();
        self.with_table(table, |record| {
            let col = record
                .columns
                .iter_mut()
                .find(|c| c.name == column)
                .ok_or_else(|| {
                    DossierError::illegal_state(format!("unknown column {}.{}", record.name, column))
                })?;
            col.value_stats = Some(stats.clone());
            Ok(())
        })
    }

    pub fn set_er_diagram(&self, diagram: impl Into<String>) {
        self.inner.write().expect("dossier lock poisoned").er_diagram = Some(diagram.into());
    }

    pub fn set_join_paths(&self, paths: BTreeMap<String, Vec<String>>) {
        self.inner.write().expect("dossier lock poisoned").join_paths = paths;
    }

    pub fn set_field_semantics(&self, semantics: BTreeMap<String, String>) {
        self.inner.write().expect("dossier lock poisoned").field_semantics = semantics;
    }

    fn with_table<F>(&self, table: &str, f: F) -> DossierResult<()>
    where
        F: Fn(&mut TableRecord) -> DossierResult<()>,
    {
        let mut doc = self.inner.write().expect("dossier lock poisoned");
        let record = doc
            .tables
            .get_mut(table)
            .ok_or_else(|| DossierError::illegal_state(format!("unknown table {}", table)))?;
        f(record)
    }

    // ------------------------------------------------------------------
    // Temp data
    // ------------------------------------------------------------------

    pub fn put_temp(&self, key: impl Into<String>, result: QueryResult) {
        self.temp.insert(key.into(), result);
    }

    pub fn take_temp(&self, key: &str) -> Option<QueryResult> {
        self.temp.remove(key).map(|(_, v)| v)
    }

    pub fn has_temp(&self, key: &str) -> bool {
        self.temp.contains_key(key)
    }

    // ------------------------------------------------------------------
    // Composite build
    // ------------------------------------------------------------------

    /// Assemble a table record from the stashed probe results.
    ///
    /// One lock acquisition for the whole composite update. Live columns
    /// and indexes replace any seed data; seed foreign keys are preserved
    /// alongside live ones.
    pub fn build_table_metadata(
        &self,
        table: &str,
        dialect: Dialect,
        seed: Option<&TableRecord>,
    ) -> DossierResult<()> {
        let columns_raw = self.take_temp(&TempKind::Columns.key(table));
        let indexes_raw = self.take_temp(&TempKind::Indexes.key(table));
        let rowcount_raw = self.take_temp(&TempKind::RowCount.key(table));
        let fks_raw = self.take_temp(&TempKind::ForeignKeys.key(table));

        let columns_raw = columns_raw.ok_or_else(|| {
            DossierError::parse(format!("no column metadata collected for table {}", table))
        })?;

        let (columns, primary_key) = parse_columns(dialect, &columns_raw)?;
        let indexes = indexes_raw.map(|r| parse_indexes(dialect, &r)).unwrap_or_default();
        let row_count = rowcount_raw.and_then(|r| r.scalar_u64()).unwrap_or(0);
        let mut foreign_keys = fks_raw.map(|r| parse_foreign_keys(dialect, &r)).unwrap_or_default();

        if let Some(seed) = seed {
            for fk in &seed.foreign_keys {
                if !foreign_keys.contains(fk) {
                    foreign_keys.push(fk.clone());
                }
            }
        }

        let mut doc = self.inner.write().expect("dossier lock poisoned");
        for fk in &foreign_keys {
            doc.tables
                .entry(fk.ref_table.clone())
                .or_insert_with(|| TableRecord::new(fk.ref_table.clone()));
        }
        let record =
            doc.tables.entry(table.to_string()).or_insert_with(|| TableRecord::new(table));
        record.columns = columns;
        record.indexes = indexes;
        record.row_count = row_count;
        record.foreign_keys = foreign_keys;
        if !primary_key.is_empty() {
            record.primary_key = primary_key;
        }
        Ok(())
    }
}

// ============================================================================
// Dialect-switched result-shape parsing
// ============================================================================

fn parse_columns(dialect: Dialect, raw: &QueryResult) -> DossierResult<(Vec<Column>, Vec<String>)> {
    let mut columns = Vec::new();
    // (pk ordinal, name) so composite keys keep their declared order
    let mut pk: Vec<(u64, String)> = Vec::new();

    for row in 0..raw.rows.len() {
        match dialect {
            Dialect::Sqlite => {
                let name = raw
                    .value(row, "name")
                    .map(value_as_string)
                    .ok_or_else(|| DossierError::parse("PRAGMA table_info row without name"))?;
                let pk_ord = raw.value(row, "pk").and_then(value_as_u64).unwrap_or(0);
                if pk_ord > 0 {
                    pk.push((pk_ord, name.clone()));
                }
                columns.push(Column {
                    name,
                    data_type: raw.value(row, "type").map(value_as_string).unwrap_or_default(),
                    nullable: raw.value(row, "notnull").and_then(value_as_u64) != Some(1),
                    default_value: raw
                        .value(row, "dflt_value")
                        .filter(|v| !v.is_null())
                        .map(value_as_string),
                    primary_key: pk_ord > 0,
                    value_stats: None,
                });
            }
            Dialect::MySql => {
                let name = raw
                    .value(row, "Field")
                    .map(value_as_string)
                    .ok_or_else(|| DossierError::parse("DESCRIBE row without Field"))?;
                let key = raw.value(row, "Key").map(value_as_string).unwrap_or_default();
                if key == "PRI" {
                    pk.push((pk.len() as u64 + 1, name.clone()));
                }
                columns.push(Column {
                    name,
                    data_type: raw.value(row, "Type").map(value_as_string).unwrap_or_default(),
                    nullable: raw.value(row, "Null").map(value_as_string).as_deref() != Some("NO"),
                    default_value: raw
                        .value(row, "Default")
                        .filter(|v| !v.is_null())
                        .map(value_as_string),
                    primary_key: key == "PRI",
                    value_stats: None,
                });
            }
            Dialect::Postgres => {
                let name = raw
                    .value(row, "column_name")
                    .map(value_as_string)
                    .ok_or_else(|| DossierError::parse("information_schema row without column_name"))?;
                columns.push(Column {
                    name,
                    data_type: raw
                        .value(row, "data_type")
                        .map(value_as_string)
                        .unwrap_or_default(),
                    nullable: raw.value(row, "is_nullable").map(value_as_string).as_deref()
                        != Some("NO"),
                    default_value: raw
                        .value(row, "column_default")
                        .filter(|v| !v.is_null())
                        .map(value_as_string),
                    primary_key: false,
                    value_stats: None,
                });
            }
        }
    }

    pk.sort_by_key(|(ord, _)| *ord);
    Ok((columns, pk.into_iter().map(|(_, name)| name).collect()))
}

fn parse_indexes(dialect: Dialect, raw: &QueryResult) -> Vec<Index> {
    match dialect {
        Dialect::Sqlite => (0..raw.rows.len())
            .filter_map(|row| {
                Some(Index {
                    name: raw.value(row, "name").map(value_as_string)?,
                    columns: Vec::new(),
                    unique: raw.value(row, "unique").and_then(value_as_u64) == Some(1),
                })
            })
            .collect(),
        Dialect::MySql => {
            // SHOW INDEX emits one row per (index, column); group them
            let mut indexes: Vec<Index> = Vec::new();
            for row in 0..raw.rows.len() {
                let Some(name) = raw.value(row, "Key_name").map(value_as_string) else { continue };
                let column = raw.value(row, "Column_name").map(value_as_string);
                let unique = raw.value(row, "Non_unique").and_then(value_as_u64) == Some(0);
                match indexes.iter_mut().find(|i| i.name == name) {
                    Some(index) => index.columns.extend(column),
                    None => indexes.push(Index {
                        name,
                        columns: column.into_iter().collect(),
                        unique,
                    }),
                }
            }
            indexes
        }
        Dialect::Postgres => (0..raw.rows.len())
            .filter_map(|row| {
                let def = raw.value(row, "indexdef").map(value_as_string).unwrap_or_default();
                let columns = def
                    .rsplit_once('(')
                    .map(|(_, tail)| {
                        tail.trim_end_matches(')')
                            .split(',')
                            .map(|c| c.trim().to_string())
                            .filter(|c| !c.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                Some(Index {
                    name: raw.value(row, "indexname").map(value_as_string)?,
                    columns,
                    unique: def.to_uppercase().contains("UNIQUE"),
                })
            })
            .collect(),
    }
}

fn parse_foreign_keys(dialect: Dialect, raw: &QueryResult) -> Vec<ForeignKey> {
    let (col_field, table_field, ref_field) = match dialect {
        Dialect::Sqlite => ("from", "table", "to"),
        Dialect::MySql => ("COLUMN_NAME", "REFERENCED_TABLE_NAME", "REFERENCED_COLUMN_NAME"),
        Dialect::Postgres => ("column_name", "referenced_table", "referenced_column"),
    };
    (0..raw.rows.len())
        .filter_map(|row| {
            Some(ForeignKey {
                column: raw.value(row, col_field).map(value_as_string)?,
                ref_table: raw.value(row, table_field).map(value_as_string)?.to_lowercase(),
                ref_column: raw
                    .value(row, ref_field)
                    .filter(|v| !v.is_null())
                    .map(value_as_string)
                    .unwrap_or_default(),
            })
        })
        .collect()
}
