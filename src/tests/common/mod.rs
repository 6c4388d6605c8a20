//! Shared test fixtures
//!
//! A rule-based scripted reasoner that plays the model's side of every
//! agent conversation, and helpers for building on-disk SQLite fixtures.

use crate::services::llm::{ChatMessage, LlmError, Reasoner};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;

/// Deterministic stand-in for the LLM.
///
/// Stateless per call: the next reply is a pure function of the transcript,
/// so concurrent agent loops can share one instance.
#[derive(Default)]
pub struct ScriptedReasoner {
    /// Simulate an LLM failure during the exploration phase of one table
    pub fail_phase2_for: Option<String>,
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let system = messages.first().map(|m| m.content.as_str()).unwrap_or("");
        let task = messages.get(1).map(|m| m.content.as_str()).unwrap_or("");
        let observations = messages
            .iter()
            .filter(|m| m.role == "user" && m.content.starts_with("Observation:"))
            .count();

        if system.contains("coordinator of a database analysis pipeline") {
            return Ok(coordinator_reply(task, observations));
        }
        if system.contains("collecting the basic metadata") {
            return Ok(phase1_reply(task, observations));
        }
        if system.contains("data-quality and business analyst") {
            let table = quoted_name(task).unwrap_or_default();
            if self.fail_phase2_for.as_deref() == Some(table.as_str()) {
                return Err(LlmError::Timeout(1));
            }
            return Ok(phase2_reply(&table, observations));
        }
        if system.contains("one-sentence descriptions") {
            let table = quoted_name(task).unwrap_or_else(|| "unknown".to_string());
            return Ok(format!("Stores the {} records of the fixture database.", table));
        }
        Err(LlmError::Api(format!("scripted reasoner: unrecognized prompt: {}", system)))
    }
}

fn coordinator_reply(task: &str, observations: usize) -> String {
    if observations == 0 {
        // the discovery query is quoted verbatim in the task prompt
        let query = task
            .lines()
            .find(|l| l.contains("sqlite_master") || l.contains("information_schema.tables"))
            .unwrap_or("SELECT name FROM sqlite_master WHERE type='table'");
        format!("Thought: list the tables\nAction: execute_sql\nAction Input: {}", query)
    } else {
        "Final Answer: discovery complete".to_string()
    }
}

fn phase1_reply(task: &str, observations: usize) -> String {
    let queries: Vec<&str> = ["1. ", "2. ", "3. ", "4. "]
        .iter()
        .filter_map(|prefix| {
            task.lines()
                .find(|l| l.trim_start().starts_with(prefix))
                .map(|l| l.trim_start()[prefix.len()..].trim())
        })
        .collect();

    match queries.get(observations) {
        Some(query) => {
            format!("Thought: run probe {}\nAction: execute_sql\nAction Input: {}", observations + 1, query)
        }
        None => "Final Answer: metadata collected".to_string(),
    }
}

fn phase2_reply(table: &str, observations: usize) -> String {
    match observations {
        0 => format!(
            "Thought: look at the data first\nAction: execute_sql\nAction Input: SELECT COUNT(*) FROM \"{}\"",
            table
        ),
        1 => format!(
            "Thought: record what I learned\nAction: set_rich_context\nAction Input: business_rules|Rows of {} are referenced by id from sibling tables.",
            table
        ),
        _ => "Final Answer: exploration recorded".to_string(),
    }
}

/// First single-quoted name in a prompt, e.g. `table 'singer'`
fn quoted_name(text: &str) -> Option<String> {
    let start = text.find('\'')? + 1;
    let end = text[start..].find('\'')? + start;
    Some(text[start..end].to_string())
}

/// Create an on-disk SQLite database from DDL/DML statements
pub async fn create_sqlite_db(path: &Path, statements: &[&str]) {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("failed to create fixture database");
    for stmt in statements {
        sqlx::query(stmt).execute(&pool).await.expect("fixture statement failed");
    }
    pool.close().await;
}

/// Lay out `{dir}/{name}/{name}.sqlite` (+ optional schema.sql) and return the folder
pub async fn create_database_folder(
    dir: &Path,
    name: &str,
    statements: &[&str],
    schema_sql: Option<&str>,
) {
    let folder = dir.join(name);
    std::fs::create_dir_all(&folder).unwrap();
    create_sqlite_db(&folder.join(format!("{}.sqlite", name)), statements).await;
    if let Some(ddl) = schema_sql {
        std::fs::write(folder.join("schema.sql"), ddl).unwrap();
    }
}
