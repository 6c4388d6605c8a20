// Worker Agent
// Purpose: per-table analysis in three phases - scripted metadata probes,
// free-form quality/meaning exploration, one-sentence description.
//
// Failure policy: phase 1 failure fails the task; the deterministic
// profiler then has nothing to work on. Phase 2 and 3 failures are logged
// and swallowed - the table keeps its metadata and profiler output.

use super::prompts;
use super::react::{ReactLoop, Tool};
use crate::models::TableRecord;
use crate::services::dossier_store::{classify_probe, DossierStore, TempKind};
use crate::services::executor::QueryExecutor;
use crate::services::llm::{ChatMessage, Reasoner};
use crate::services::profiler::Profiler;
use crate::utils::error::{DossierError, DossierResult};
use crate::utils::string_ext::{strip_react_scaffolding, StringExt};
use chrono::Utc;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Iteration bound per worker reasoning phase
pub const WORKER_MAX_STEPS: usize = 25;

/// Business notes written by the workers expire after a week
const NOTE_TTL_DAYS: i64 = 7;

pub struct Worker {
    table: String,
    task_id: String,
    reasoner: Arc<dyn Reasoner>,
    executor: Arc<dyn QueryExecutor>,
    store: Arc<DossierStore>,
    seed: Option<TableRecord>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    pub fn new(
        table: impl Into<String>,
        reasoner: Arc<dyn Reasoner>,
        executor: Arc<dyn QueryExecutor>,
        store: Arc<DossierStore>,
        seed: Option<TableRecord>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        let table = table.into();
        Self {
            task_id: format!("analyze_{}", table),
            table,
            reasoner,
            executor,
            store,
            seed,
            shutdown,
        }
    }

    /// Run the full per-table routine and settle the task state.
    pub async fn run(&self) -> DossierResult<()> {
        self.store.start_task(&self.task_id)?;

        if let Err(e) = self.collect_basic_metadata().await {
            tracing::error!("worker {}: metadata phase failed: {}", self.table, e);
            self.store.fail_task(&self.task_id, e.summary_message(200))?;
            return Err(e);
        }

        let profiler = Profiler::new(Arc::clone(&self.executor));
        if let Err(e) = profiler.profile_table(&self.store, &self.table).await {
            tracing::error!("worker {}: profiler failed: {}", self.table, e);
            self.store.fail_task(&self.task_id, e.summary_message(200))?;
            return Err(e);
        }

        if let Err(e) = self.explore_rich_context().await {
            tracing::warn!("worker {}: exploration phase failed, continuing: {}", self.table, e);
        }

        if let Err(e) = self.write_description().await {
            tracing::warn!("worker {}: description phase failed, continuing: {}", self.table, e);
        }

        let record = self.record()?;
        self.store.complete_task(
            &self.task_id,
            Some(serde_json::json!({
                "table": self.table,
                "columns": record.columns.len(),
                "row_count": record.row_count,
                "quality_issues": record.quality_issues.len(),
            })),
        )?;
        Ok(())
    }

    fn record(&self) -> DossierResult<TableRecord> {
        self.store
            .get_table_record(&self.table)
            .ok_or_else(|| DossierError::illegal_state(format!("unknown table {}", self.table)))
    }

    // ------------------------------------------------------------------
    // Phase 1 - basic metadata
    // ------------------------------------------------------------------

    /// Scripted loop: the model runs four dialect-specific probes; the tool
    /// stashes each classified result, and the store assembles the record.
    async fn collect_basic_metadata(&self) -> DossierResult<()> {
        let dialect = self.executor.dialect();

        let tool = {
            let executor = Arc::clone(&self.executor);
            let store = Arc::clone(&self.store);
            let table = self.table.clone();
            Tool::new(
                "execute_sql",
                "Run one read-only SQL statement and observe the result rows",
                move |input: String| {
                    let executor = Arc::clone(&executor);
                    let store = Arc::clone(&store);
                    let table = table.clone();
                    async move {
                        let sql = input.trim();
                        match executor.execute(sql).await {
                            Ok(result) => {
                                if let Some(kind) = classify_probe(sql) {
                                    store.put_temp(kind.key(&table), result.clone());
                                }
                                result.to_observation(50)
                            }
                            Err(e) => format!("Error: {}", e),
                        }
                    }
                },
            )
        };

        let agent = ReactLoop::new(
            format!("worker_{}:metadata", self.table),
            Arc::clone(&self.reasoner),
            vec![tool],
            WORKER_MAX_STEPS,
            Arc::clone(&self.shutdown),
        );
        agent
            .run(
                prompts::WORKER_PHASE1_SYSTEM,
                &prompts::worker_phase1_task(dialect, &self.table),
            )
            .await?;

        if !self.store.has_temp(&TempKind::Columns.key(&self.table)) {
            return Err(DossierError::parse(format!(
                "worker {}: column probe was never executed",
                self.table
            )));
        }

        self.store.build_table_metadata(&self.table, dialect, self.seed.as_ref())
    }

    // ------------------------------------------------------------------
    // Phase 2 - rich context exploration
    // ------------------------------------------------------------------

    async fn explore_rich_context(&self) -> DossierResult<()> {
        let record = self.record()?;

        let execute_sql = {
            let executor = Arc::clone(&self.executor);
            Tool::new(
                "execute_sql",
                "Run one read-only SQL statement and observe the result rows",
                move |input: String| {
                    let executor = Arc::clone(&executor);
                    async move {
                        match executor.execute(input.trim()).await {
                            Ok(result) => result.to_observation(20),
                            Err(e) => format!("Error: {}", e),
                        }
                    }
                },
            )
        };

        let set_rich_context = {
            let store = Arc::clone(&self.store);
            let table = self.table.clone();
            Tool::new(
                "set_rich_context",
                "Record a business note. Input format: key|value (snake_case key, pipe, note text)",
                move |input: String| {
                    let store = Arc::clone(&store);
                    let table = table.clone();
                    async move {
                        let Some((key, value)) = input.split_once('|') else {
                            return "Error: expected input of the form key|value".to_string();
                        };
                        let key = key.trim();
                        let value = strip_react_scaffolding(value);
                        if key.is_empty() || value.is_empty() {
                            return "Error: key and value must both be non-empty".to_string();
                        }
                        let expires_at = Utc::now() + chrono::Duration::days(NOTE_TTL_DAYS);
                        match store.set_rich_context_entry(&table, key, value, expires_at) {
                            Ok(()) => format!("Recorded note '{}'", key),
                            Err(e) => format!("Error: {}", e),
                        }
                    }
                },
            )
        };

        let agent = ReactLoop::new(
            format!("worker_{}:explore", self.table),
            Arc::clone(&self.reasoner),
            vec![execute_sql, set_rich_context],
            WORKER_MAX_STEPS,
            Arc::clone(&self.shutdown),
        );
        agent
            .run(prompts::WORKER_PHASE2_SYSTEM, &prompts::worker_phase2_task(&record))
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase 3 - description
    // ------------------------------------------------------------------

    async fn write_description(&self) -> DossierResult<()> {
        let record = self.record()?;
        let messages = vec![
            ChatMessage::system(prompts::DESCRIPTION_SYSTEM),
            ChatMessage::user(prompts::description_task(&record)),
        ];
        let text = self
            .reasoner
            .chat(&messages)
            .await
            .map_err(|e| DossierError::agent(format!("description for {}: {}", self.table, e)))?;

        let sentence = text
            .trim()
            .strip_prefix("Final Answer:")
            .unwrap_or(text.trim())
            .trimmed();
        if let Some(sentence) = sentence.clean() {
            self.store.set_description(&self.table, sentence)?;
        }
        Ok(())
    }
}
