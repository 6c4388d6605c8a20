//! Dossier data models
//!
//! The per-database document this pipeline produces. Everything here is
//! plain serde data: created empty, mutated through the store while the
//! agents run, serialized once at the end, immutable afterwards.
//!
//! Map-valued fields use `BTreeMap` so the on-disk JSON has a stable key
//! order and a load/serialize round trip is byte-equivalent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Dialect
// ============================================================================

/// Database kind the executor speaks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Dossier root document
// ============================================================================

/// Per-database root document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dossier {
    /// Database identity
    pub database: String,
    pub dialect: Dialect,
    /// Collection timestamp
    pub collected_at: DateTime<Utc>,
    /// Table name -> record
    #[serde(default)]
    pub tables: BTreeMap<String, TableRecord>,
    /// ER diagram rendered from the foreign-key graph
    #[serde(skip_serializing_if = "Option::is_none")]
    pub er_diagram: Option<String>,
    /// Shortest join path cache, keyed "from->to"
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub join_paths: BTreeMap<String, Vec<String>>,
    /// Field-semantics cache, keyed "table.column"
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_semantics: BTreeMap<String, String>,
}

impl Dossier {
    pub fn new(database: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            database: database.into(),
            dialect,
            collected_at: Utc::now(),
            tables: BTreeMap::new(),
            er_diagram: None,
            join_paths: BTreeMap::new(),
            field_semantics: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Table record
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRecord {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// One-sentence purpose statement written by the worker agent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    /// LLM-authored business notes, keyed by an LLM-chosen name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rich_context: BTreeMap<String, BusinessNote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality_issues: Vec<QualityIssue>,
}

impl TableRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            description: None,
            row_count: 0,
            primary_key: Vec::new(),
            columns: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            rich_context: BTreeMap::new(),
            quality_issues: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Whether the named column participates in a foreign key
    pub fn is_foreign_key_column(&self, name: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.column == name)
    }
}

// ============================================================================
// Column, index, foreign key
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Dialect-agnostic type string as reported by the engine
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_stats: Option<ValueStats>,
}

impl Column {
    /// TEXT-family check (TEXT/VARCHAR/CHAR/CLOB/STRING, case-insensitive)
    pub fn is_text_family(&self) -> bool {
        let ty = self.data_type.to_ascii_uppercase();
        ["TEXT", "VARCHAR", "CHAR", "CLOB", "STRING"].iter().any(|t| ty.contains(t))
    }

    /// Numeric-family check (INT/REAL/FLOAT/DOUBLE/NUMERIC/DECIMAL)
    pub fn is_numeric_family(&self) -> bool {
        let ty = self.data_type.to_ascii_uppercase();
        ["INT", "REAL", "FLOAT", "DOUBLE", "NUMERIC", "DECIMAL"].iter().any(|t| ty.contains(t))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// local column -> referenced table.column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

// ============================================================================
// Value statistics
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueStats {
    pub distinct_count: u64,
    pub null_count: u64,
    pub null_percent: f64,
    /// TEXT columns only: count of values equal to ''
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_count: Option<u64>,
    /// Present when distinct_count is between 1 and 30; at most 15 entries,
    /// sorted descending by count
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_values: Option<Vec<TopValue>>,
    /// Numeric columns only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<NumericRange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopValue {
    pub value: String,
    pub count: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

// ============================================================================
// Quality issues
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Whitespace,
    TypeMismatch,
    Orphan,
    NullHeavy,
    EmptyString,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::TypeMismatch => "type_mismatch",
            Self::Orphan => "orphan",
            Self::NullHeavy => "null_heavy",
            Self::EmptyString => "empty_string",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// SQL operation classes an issue can corrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlOp {
    #[serde(rename = "JOIN")]
    Join,
    #[serde(rename = "WHERE")]
    Where,
    #[serde(rename = "GROUP BY")]
    GroupBy,
    #[serde(rename = "ORDER BY")]
    OrderBy,
    #[serde(rename = "HAVING")]
    Having,
}

impl SqlOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Where => "WHERE",
            Self::GroupBy => "GROUP BY",
            Self::OrderBy => "ORDER BY",
            Self::Having => "HAVING",
        }
    }
}

/// Structured defect record produced deterministically by the profiler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    pub table: String,
    pub column: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    /// Reusable SQL snippet that neutralizes the defect
    pub sql_fix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_ops: Vec<SqlOp>,
    /// Up to three example literals
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
}

// ============================================================================
// Business notes
// ============================================================================

/// Reserved temp-data suffixes; rich-context keys must never use them
pub const RESERVED_CONTEXT_SUFFIXES: [&str; 4] =
    ["_columns", "_indexes", "_rowcount", "_foreignkeys"];

/// Whether a rich-context key collides with the reserved metadata suffixes
pub fn is_reserved_context_key(key: &str) -> bool {
    RESERVED_CONTEXT_SUFFIXES.iter().any(|s| key.ends_with(s))
}

/// LLM-authored note with an expiry
///
/// Two historical encodings exist on disk: a bare string and the object
/// form. Deserialization accepts both and normalizes to the object.
#[derive(Debug, Clone, Serialize)]
pub struct BusinessNote {
    pub content: String,
    pub expires_at: DateTime<Utc>,
}

impl BusinessNote {
    /// Note expiring seven days from now (the worker agents' default)
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), expires_at: Utc::now() + chrono::Duration::days(7) }
    }
}

impl<'de> Deserialize<'de> for BusinessNote {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Object { content: String, expires_at: DateTime<Utc> },
            Bare(String),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Object { content, expires_at } => BusinessNote { content, expires_at },
            Repr::Bare(content) => BusinessNote::new(content),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_numeric_family_detection() {
        let col = |ty: &str| Column {
            name: "c".into(),
            data_type: ty.into(),
            nullable: true,
            default_value: None,
            primary_key: false,
            value_stats: None,
        };
        assert!(col("VARCHAR(120)").is_text_family());
        assert!(col("clob").is_text_family());
        assert!(!col("INTEGER").is_text_family());
        assert!(col("DECIMAL(10,2)").is_numeric_family());
        assert!(col("bigint").is_numeric_family());
        assert!(!col("TEXT").is_numeric_family());
    }

    #[test]
    fn sql_op_serializes_with_spaces() {
        assert_eq!(serde_json::to_string(&SqlOp::GroupBy).unwrap(), "\"GROUP BY\"");
        assert_eq!(serde_json::from_str::<SqlOp>("\"ORDER BY\"").unwrap(), SqlOp::OrderBy);
    }

    #[test]
    fn business_note_accepts_both_encodings() {
        let obj: BusinessNote =
            serde_json::from_str(r#"{"content":"x","expires_at":"2025-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(obj.content, "x");

        let bare: BusinessNote = serde_json::from_str(r#""legacy note""#).unwrap();
        assert_eq!(bare.content, "legacy note");
        assert!(bare.expires_at > Utc::now());
    }

    #[test]
    fn reserved_key_detection() {
        assert!(is_reserved_context_key("singer_columns"));
        assert!(is_reserved_context_key("concert_rowcount"));
        assert!(!is_reserved_context_key("status_values"));
    }

    #[test]
    fn dossier_round_trips() {
        let mut d = Dossier::new("concert_singer", Dialect::Sqlite);
        let mut t = TableRecord::new("singer");
        t.row_count = 2;
        t.foreign_keys.push(ForeignKey {
            column: "id".into(),
            ref_table: "singer".into(),
            ref_column: "id".into(),
        });
        d.tables.insert("singer".into(), t);

        let json = serde_json::to_string_pretty(&d).unwrap();
        let back: Dossier = serde_json::from_str(&json).unwrap();
        let json2 = serde_json::to_string_pretty(&back).unwrap();
        assert_eq!(json, json2);
    }
}
