// Coordinator Agent
// Purpose: discover the database's tables through one LLM-driven probe and
// register one analysis task per table. Failure here is fatal for the
// database: without a schema there is no work to schedule.

use super::prompts;
use super::react::{ReactLoop, Tool};
use crate::services::executor::{is_discovery_sql, value_as_string, QueryExecutor};
use crate::services::dossier_store::DossierStore;
use crate::services::llm::Reasoner;
use crate::utils::error::{DossierError, DossierResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Iteration bound for the discovery loop
pub const COORDINATOR_MAX_STEPS: usize = 15;

pub struct Coordinator {
    reasoner: Arc<dyn Reasoner>,
    executor: Arc<dyn QueryExecutor>,
    store: Arc<DossierStore>,
    shutdown: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<DossierStore>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { reasoner, executor, store, shutdown }
    }

    /// Run discovery; returns the number of analysis tasks registered.
    pub async fn run(&self) -> DossierResult<usize> {
        let discovered = Arc::new(AtomicBool::new(false));
        let dialect = self.executor.dialect();

        let tool = {
            let executor = Arc::clone(&self.executor);
            let store = Arc::clone(&self.store);
            let discovered = Arc::clone(&discovered);
            Tool::new(
                "execute_sql",
                "Run one read-only SQL statement and observe the result rows",
                move |input: String| {
                    let executor = Arc::clone(&executor);
                    let store = Arc::clone(&store);
                    let discovered = Arc::clone(&discovered);
                    async move {
                        let sql = input.trim();
                        match executor.execute(sql).await {
                            Ok(result) => {
                                if is_discovery_sql(sql) {
                                    register_discovered_tables(&store, &result);
                                    discovered.store(true, Ordering::Relaxed);
                                }
                                result.to_observation(100)
                            }
                            Err(e) => format!("Error: {}", e),
                        }
                    }
                },
            )
        };

        let agent = ReactLoop::new(
            "coordinator",
            Arc::clone(&self.reasoner),
            vec![tool],
            COORDINATOR_MAX_STEPS,
            Arc::clone(&self.shutdown),
        );

        let outcome = agent
            .run(prompts::COORDINATOR_SYSTEM, &prompts::coordinator_task(dialect))
            .await?;

        if !discovered.load(Ordering::Relaxed) {
            return Err(DossierError::agent(
                "coordinator finished without running a discovery query",
            ));
        }

        let tasks = self.store.list_tasks().len();
        tracing::info!(
            "coordinator: {} tables discovered in {} steps",
            tasks,
            outcome.steps
        );
        Ok(tasks)
    }
}

/// Register one `analyze_<table>` task per discovered name.
///
/// The table list is the first column of the discovery result. Names are
/// lowercased for lookup, matching the schema parser's convention.
fn register_discovered_tables(store: &DossierStore, result: &crate::services::executor::QueryResult) {
    for row in &result.rows {
        let Some(name) = row.first().map(value_as_string) else { continue };
        let name = name.trim().to_lowercase();
        if name.is_empty() {
            continue;
        }
        store.ensure_table(&name);
        let task_id = format!("analyze_{}", name);
        match store.register_task(&task_id, format!("worker_{}", name), format!("analyze table {}", name)) {
            Ok(()) => tracing::debug!("registered task {}", task_id),
            Err(_) => tracing::debug!("task {} already registered, skipping", task_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Dialect;
    use crate::services::executor::SqliteExecutor;
    use crate::services::llm::{ChatMessage, LlmError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedReasoner {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Reasoner for CannedReasoner {
        async fn chat(&self, _messages: &[ChatMessage]) -> Result<String, LlmError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::Api("script exhausted".into()));
            }
            Ok(responses.remove(0))
        }
    }

    async fn sqlite_with(statements: &[&str]) -> Arc<dyn QueryExecutor> {
        let exec = SqliteExecutor::in_memory().await.unwrap();
        for stmt in statements {
            exec.execute(stmt).await.unwrap();
        }
        Arc::new(exec)
    }

    fn discovery_script() -> Vec<String> {
        vec![
            format!(
                "Thought: list the tables\nAction: execute_sql\nAction Input: {}",
                Dialect::Sqlite.discovery_sql()
            ),
            "Final Answer: discovery complete".to_string(),
        ]
    }

    #[tokio::test]
    async fn registers_one_task_per_table() {
        let executor = sqlite_with(&[
            "CREATE TABLE singer (id INTEGER PRIMARY KEY)",
            "CREATE TABLE concert (id INTEGER PRIMARY KEY)",
        ])
        .await;
        let store = Arc::new(DossierStore::new("db", Dialect::Sqlite));
        let reasoner = Arc::new(CannedReasoner { responses: Mutex::new(discovery_script()) });

        let coordinator = Coordinator::new(
            reasoner,
            executor,
            Arc::clone(&store),
            Arc::new(AtomicBool::new(false)),
        );
        let registered = coordinator.run().await.unwrap();

        assert_eq!(registered, 2);
        let tasks = store.list_tasks();
        assert!(tasks.iter().any(|t| t.id == "analyze_singer" && t.owner == "worker_singer"));
        assert!(tasks.iter().any(|t| t.id == "analyze_concert"));
        assert_eq!(store.list_tables().len(), 2);
    }

    #[tokio::test]
    async fn zero_tables_is_success() {
        let executor = sqlite_with(&[]).await;
        let store = Arc::new(DossierStore::new("db", Dialect::Sqlite));
        let reasoner = Arc::new(CannedReasoner { responses: Mutex::new(discovery_script()) });

        let coordinator = Coordinator::new(
            reasoner,
            executor,
            Arc::clone(&store),
            Arc::new(AtomicBool::new(false)),
        );
        assert_eq!(coordinator.run().await.unwrap(), 0);
        assert!(store.list_tables().is_empty());
    }

    #[tokio::test]
    async fn finishing_without_discovery_is_fatal() {
        let executor = sqlite_with(&[]).await;
        let store = Arc::new(DossierStore::new("db", Dialect::Sqlite));
        let reasoner = Arc::new(CannedReasoner {
            responses: Mutex::new(vec!["Final Answer: nothing to do".to_string()]),
        });

        let coordinator =
            Coordinator::new(reasoner, executor, store, Arc::new(AtomicBool::new(false)));
        let err = coordinator.run().await.unwrap_err();
        assert!(matches!(err, DossierError::Agent(_)));
    }
}
