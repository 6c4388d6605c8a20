//! Worker agent tests - the three-phase per-table routine against an
//! in-memory database and the scripted reasoner.

use super::common::ScriptedReasoner;
use crate::models::{Dialect, TaskStatus};
use crate::services::agents::Worker;
use crate::services::dossier_store::DossierStore;
use crate::services::executor::{QueryExecutor, SqliteExecutor};
use crate::services::llm::{ChatMessage, LlmError, Reasoner};
use async_trait::async_trait;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

async fn singer_fixture() -> Arc<dyn QueryExecutor> {
    let exec = SqliteExecutor::in_memory().await.unwrap();
    for stmt in [
        "CREATE TABLE singer (id INTEGER PRIMARY KEY, name TEXT NOT NULL, age INT)",
        "INSERT INTO singer VALUES (1, 'Adele', 34), (2, ' Beyoncé ', 41)",
    ] {
        exec.execute(stmt).await.unwrap();
    }
    Arc::new(exec)
}

fn worker(
    executor: Arc<dyn QueryExecutor>,
    store: Arc<DossierStore>,
    reasoner: Arc<dyn Reasoner>,
) -> Worker {
    Worker::new(
        "singer",
        reasoner,
        executor,
        store,
        None,
        Arc::new(AtomicBool::new(false)),
    )
}

fn registered_store() -> Arc<DossierStore> {
    let store = Arc::new(DossierStore::new("db", Dialect::Sqlite));
    store.ensure_table("singer");
    store.register_task("analyze_singer", "worker_singer", "analyze table singer").unwrap();
    store
}

#[tokio::test]
async fn full_routine_builds_profiles_and_describes() {
    let executor = singer_fixture().await;
    let store = registered_store();
    let reasoner: Arc<dyn Reasoner> = Arc::new(ScriptedReasoner::default());

    worker(executor, Arc::clone(&store), reasoner).run().await.unwrap();

    let record = store.get_table_record("singer").unwrap();
    // phase 1: metadata
    assert_eq!(record.row_count, 2);
    assert_eq!(record.primary_key, vec!["id"]);
    assert_eq!(record.columns.len(), 3);
    // profiler ran between phases
    assert!(record
        .quality_issues
        .iter()
        .any(|i| i.issue_type == crate::models::IssueType::Whitespace && i.column == "name"));
    assert!(record.column("age").unwrap().value_stats.as_ref().unwrap().range.is_some());
    // phase 2: note recorded
    assert!(record.rich_context.contains_key("business_rules"));
    // phase 3: description
    assert!(record.description.as_deref().unwrap().contains("singer"));

    let task = store.list_tasks().into_iter().find(|t| t.id == "analyze_singer").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.result.is_some());
}

#[tokio::test]
async fn phase2_failure_is_swallowed() {
    let executor = singer_fixture().await;
    let store = registered_store();
    let reasoner: Arc<dyn Reasoner> =
        Arc::new(ScriptedReasoner { fail_phase2_for: Some("singer".to_string()) });

    worker(executor, Arc::clone(&store), reasoner).run().await.unwrap();

    let record = store.get_table_record("singer").unwrap();
    // metadata and profiler output survive the failed exploration
    assert_eq!(record.columns.len(), 3);
    assert!(!record.quality_issues.is_empty());
    assert!(record.rich_context.is_empty());

    let task = store.list_tasks().into_iter().find(|t| t.id == "analyze_singer").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
}

struct FailingReasoner;

#[async_trait]
impl Reasoner for FailingReasoner {
    async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
        Err(LlmError::Api("model unavailable".into()))
    }
}

#[tokio::test]
async fn phase1_failure_fails_the_task() {
    let executor = singer_fixture().await;
    let store = registered_store();

    let result = worker(executor, Arc::clone(&store), Arc::new(FailingReasoner)).run().await;
    assert!(result.is_err());

    let task = store.list_tasks().into_iter().find(|t| t.id == "analyze_singer").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("model unavailable"));

    let record = store.get_table_record("singer").unwrap();
    assert!(record.columns.is_empty());
}
