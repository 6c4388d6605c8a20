// Orchestrator
// Purpose: run the whole pipeline per database - seed, discover, fan out
// workers under a concurrency bound, derive the join topology, persist the
// dossier - and batch over many databases under a second bound.
//
// Failure discipline: errors are recovered at the task boundary (one
// table) and the database boundary (one database). A failing database is
// recorded in the batch summary and never aborts its siblings; its partial
// dossier is never written.

use crate::models::{Dossier, TableRecord};
use crate::services::agents::{Coordinator, Worker};
use crate::services::dossier_store::DossierStore;
use crate::services::executor::{connect_sqlite, QueryExecutor};
use crate::services::llm::Reasoner;
use crate::services::schema_parser::parse_ddl;
use crate::utils::error::{DossierError, DossierResult};
use crate::utils::progress::ProgressReporter;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

/// One database to process
#[derive(Debug, Clone)]
pub struct DatabaseTarget {
    pub name: String,
    pub db_path: PathBuf,
    pub schema_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct DatabaseOutcome {
    pub database: String,
    pub status: DatabaseStatus,
    pub tables: usize,
    pub issues: usize,
    pub error: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<DatabaseOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == DatabaseStatus::Succeeded).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == DatabaseStatus::Failed).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == DatabaseStatus::Skipped).count()
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "Processed {} databases: {} succeeded, {} failed, {} skipped\n",
            self.outcomes.len(),
            self.succeeded(),
            self.failed(),
            self.skipped()
        );
        for outcome in &self.outcomes {
            let line = match outcome.status {
                DatabaseStatus::Succeeded => format!(
                    "  {}: OK ({} tables, {} issues, {:.1}s)\n",
                    outcome.database,
                    outcome.tables,
                    outcome.issues,
                    outcome.elapsed_ms as f64 / 1000.0
                ),
                DatabaseStatus::Failed => format!(
                    "  {}: FAILED - {}\n",
                    outcome.database,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
                DatabaseStatus::Skipped => {
                    format!("  {}: skipped (dossier exists)\n", outcome.database)
                }
            };
            out.push_str(&line);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub output_dir: PathBuf,
    /// Concurrency across databases
    pub database_workers: usize,
    /// Concurrency across tables within one database
    pub table_workers: usize,
    pub skip_existing: bool,
}

pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    options: OrchestratorOptions,
    shutdown: Arc<AtomicBool>,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        options: OrchestratorOptions,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self { reasoner, options, shutdown }
    }

    /// Process every target; per-database failures are recorded, not raised.
    pub async fn run_batch(&self, targets: Vec<DatabaseTarget>) -> DossierResult<BatchSummary> {
        std::fs::create_dir_all(&self.options.output_dir)?;

        let progress = Arc::new(ProgressReporter::new(targets.len() as u64));
        let semaphore = Arc::new(Semaphore::new(self.options.database_workers.max(1)));
        let mut join_set: JoinSet<(usize, DatabaseOutcome)> = JoinSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let progress = Arc::clone(&progress);
            let reasoner = Arc::clone(&self.reasoner);
            let options = self.options.clone();
            let shutdown = Arc::clone(&self.shutdown);

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let outcome =
                    run_one_database(reasoner, options, shutdown, &progress, target).await;
                (index, outcome)
            });
        }

        let mut outcomes: Vec<(usize, DatabaseOutcome)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => outcomes.push(pair),
                Err(e) => tracing::error!("database task panicked: {}", e),
            }
        }
        outcomes.sort_by_key(|(index, _)| *index);

        let summary =
            BatchSummary { outcomes: outcomes.into_iter().map(|(_, o)| o).collect() };
        progress.finish(&format!(
            "{} ok / {} failed / {} skipped",
            summary.succeeded(),
            summary.failed(),
            summary.skipped()
        ));
        Ok(summary)
    }
}

async fn run_one_database(
    reasoner: Arc<dyn Reasoner>,
    options: OrchestratorOptions,
    shutdown: Arc<AtomicBool>,
    progress: &ProgressReporter,
    target: DatabaseTarget,
) -> DatabaseOutcome {
    let started = std::time::Instant::now();
    let name = target.name.clone();
    let output_path = options.output_dir.join(format!("{}.json", name));

    if options.skip_existing && output_path.exists() {
        progress.database_skipped(&name);
        return DatabaseOutcome {
            database: name,
            status: DatabaseStatus::Skipped,
            tables: 0,
            issues: 0,
            error: None,
            elapsed_ms: started.elapsed().as_millis(),
        };
    }

    let row = progress.database_started(&name);
    let run_id = Uuid::new_v4();
    tracing::info!("run {}: database {} ({})", run_id, name, target.db_path.display());

    let result = build_dossier(
        reasoner,
        &options,
        shutdown,
        &row,
        &target,
        &output_path,
    )
    .await;

    let outcome = match result {
        Ok(dossier) => DatabaseOutcome {
            database: name.clone(),
            status: DatabaseStatus::Succeeded,
            tables: dossier.tables.len(),
            issues: dossier.tables.values().map(|t| t.quality_issues.len()).sum(),
            error: None,
            elapsed_ms: started.elapsed().as_millis(),
        },
        Err(e) => DatabaseOutcome {
            database: name.clone(),
            status: DatabaseStatus::Failed,
            tables: 0,
            issues: 0,
            error: Some(e.summary_message(160)),
            elapsed_ms: started.elapsed().as_millis(),
        },
    };

    let status = match outcome.status {
        DatabaseStatus::Succeeded => format!("done ({} tables)", outcome.tables),
        DatabaseStatus::Failed => {
            format!("failed: {}", outcome.error.as_deref().unwrap_or(""))
        }
        DatabaseStatus::Skipped => "skipped".to_string(),
    };
    progress.database_finished(row, &status);
    outcome
}

async fn build_dossier(
    reasoner: Arc<dyn Reasoner>,
    options: &OrchestratorOptions,
    shutdown: Arc<AtomicBool>,
    row: &crate::utils::progress::DatabaseProgress,
    target: &DatabaseTarget,
    output_path: &Path,
) -> DossierResult<Dossier> {
    let executor = connect_sqlite(&target.db_path).await?;
    let store = Arc::new(DossierStore::new(&target.name, executor.dialect()));

    // optional DDL seed; parser failures are non-fatal
    row.set_phase("parsing schema");
    let seeds = load_seed(target);
    if !seeds.is_empty() {
        store.seed_tables(seeds.values().cloned().collect());
    }

    row.set_phase("discovering tables");
    let coordinator = Coordinator::new(
        Arc::clone(&reasoner),
        Arc::clone(&executor),
        Arc::clone(&store),
        Arc::clone(&shutdown),
    );
    let task_count = coordinator.run().await?;
    row.set_phase(&format!("analyzing {} tables", task_count));

    fan_out_workers(&reasoner, options, &shutdown, &executor, &store, &seeds).await;

    if shutdown.load(Ordering::Relaxed) {
        return Err(DossierError::agent("cancelled before persisting"));
    }

    if !store.all_tasks_complete() {
        tracing::warn!("{}: some tasks never reached a terminal state", target.name);
    }

    row.set_phase("deriving join topology");
    let snapshot = store.snapshot();
    store.set_er_diagram(render_er_diagram(&snapshot));
    store.set_join_paths(compute_join_paths(&snapshot));
    store.set_field_semantics(compute_field_semantics(&snapshot));

    row.set_phase("writing dossier");
    let dossier = store.snapshot();
    persist_dossier(&dossier, output_path)?;
    Ok(dossier)
}

fn load_seed(target: &DatabaseTarget) -> HashMap<String, TableRecord> {
    let Some(schema_path) = &target.schema_path else {
        return HashMap::new();
    };
    let ddl = match std::fs::read_to_string(schema_path) {
        Ok(ddl) => ddl,
        Err(e) => {
            tracing::warn!("{}: cannot read {}: {}", target.name, schema_path.display(), e);
            return HashMap::new();
        }
    };
    match parse_ddl(&ddl) {
        Ok(tables) => tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        Err(e) => {
            tracing::warn!(
                "{}: schema parse failed, falling back to live discovery: {}",
                target.name,
                e
            );
            HashMap::new()
        }
    }
}

async fn fan_out_workers(
    reasoner: &Arc<dyn Reasoner>,
    options: &OrchestratorOptions,
    shutdown: &Arc<AtomicBool>,
    executor: &Arc<dyn QueryExecutor>,
    store: &Arc<DossierStore>,
    seeds: &HashMap<String, TableRecord>,
) {
    let semaphore = Arc::new(Semaphore::new(options.table_workers.max(1)));
    let mut join_set: JoinSet<()> = JoinSet::new();

    for task in store.list_tasks() {
        let Some(table) = task.id.strip_prefix("analyze_").map(str::to_string) else {
            continue;
        };
        let worker = Worker::new(
            table.clone(),
            Arc::clone(reasoner),
            Arc::clone(executor),
            Arc::clone(store),
            seeds.get(&table).cloned(),
            Arc::clone(shutdown),
        );
        let semaphore = Arc::clone(&semaphore);
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            // worker settles its own task state; a failed table never
            // aborts its siblings
            if let Err(e) = worker.run().await {
                tracing::error!("table {} failed: {}", table, e);
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        if let Err(e) = joined {
            tracing::error!("worker task panicked: {}", e);
        }
    }
}

/// Serialize via a sibling temp file and rename, so a crash mid-write
/// never leaves a truncated dossier behind.
fn persist_dossier(dossier: &Dossier, output_path: &Path) -> DossierResult<()> {
    let json = serde_json::to_string_pretty(dossier)?;
    let tmp_path = output_path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json.as_bytes())?;
    std::fs::rename(&tmp_path, output_path)?;
    tracing::info!("wrote {}", output_path.display());
    Ok(())
}

// ============================================================================
// Join topology
// ============================================================================

/// Mermaid-style ER diagram from the foreign-key graph
pub fn render_er_diagram(dossier: &Dossier) -> String {
    let mut out = String::from("erDiagram\n");
    let mut related: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();

    for record in dossier.tables.values() {
        for fk in &record.foreign_keys {
            out.push_str(&format!(
                "    {} }}o--|| {} : \"{} -> {}\"\n",
                record.name, fk.ref_table, fk.column, fk.ref_column
            ));
            related.insert(record.name.as_str());
            related.insert(fk.ref_table.as_str());
        }
    }
    for record in dossier.tables.values() {
        if !related.contains(record.name.as_str()) {
            out.push_str(&format!("    {}\n", record.name));
        }
    }
    out
}

/// BFS shortest table paths over the (undirected) foreign-key adjacency map,
/// keyed "from->to" for every reachable ordered pair.
pub fn compute_join_paths(dossier: &Dossier) -> BTreeMap<String, Vec<String>> {
    // adjacency is a plain map keyed by table name; cycles are fine because
    // nodes are owned by the dossier, not by each other
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for record in dossier.tables.values() {
        adjacency.entry(record.name.as_str()).or_default();
        for fk in &record.foreign_keys {
            if fk.ref_table == record.name {
                continue; // self-references add no path
            }
            adjacency.entry(record.name.as_str()).or_default().push(fk.ref_table.as_str());
            adjacency.entry(fk.ref_table.as_str()).or_default().push(record.name.as_str());
        }
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort_unstable();
        neighbors.dedup();
    }

    let mut paths = BTreeMap::new();
    for &start in adjacency.keys() {
        let mut previous: BTreeMap<&str, &str> = BTreeMap::new();
        let mut queue = VecDeque::from([start]);
        let mut seen: std::collections::BTreeSet<&str> = std::collections::BTreeSet::from([start]);

        while let Some(node) = queue.pop_front() {
            for &next in adjacency.get(node).into_iter().flatten() {
                if seen.insert(next) {
                    previous.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        for &end in adjacency.keys() {
            if end == start || !previous.contains_key(end) {
                continue;
            }
            let mut path = vec![end.to_string()];
            let mut cursor = end;
            while let Some(&prev) = previous.get(cursor) {
                path.push(prev.to_string());
                cursor = prev;
            }
            path.reverse();
            paths.insert(format!("{}->{}", start, end), path);
        }
    }
    paths
}

/// Per-field semantic hints derived from the collected statistics, keyed
/// "table.column". Downstream prompt assembly can look fields up without
/// walking the whole record.
pub fn compute_field_semantics(dossier: &Dossier) -> BTreeMap<String, String> {
    let mut semantics = BTreeMap::new();
    for record in dossier.tables.values() {
        for column in &record.columns {
            let Some(stats) = &column.value_stats else { continue };
            let hint = if let Some(top) = &stats.top_values {
                let values: Vec<&str> = top.iter().map(|t| t.value.as_str()).collect();
                format!("enumerated: {}", values.join(", "))
            } else if let Some(range) = &stats.range {
                format!("numeric range {}..{}", range.min, range.max)
            } else {
                continue;
            };
            semantics.insert(format!("{}.{}", record.name, column.name), hint);
        }
    }
    semantics
}

// ============================================================================
// Target discovery
// ============================================================================

/// Database file extensions accepted under `{db_dir}/{name}/`
const DB_EXTENSIONS: [&str; 3] = ["sqlite", "sqlite3", "db"];

/// Scan the per-database input layout `{db_dir}/{name}/{name}.{sqlite|...}`.
///
/// `only` restricts to a single database; `allowed` (from a dev file)
/// restricts to a benchmark's id list while preserving its order.
pub fn discover_targets(
    db_dir: &Path,
    only: Option<&str>,
    allowed: Option<&[String]>,
) -> DossierResult<Vec<DatabaseTarget>> {
    if !db_dir.is_dir() {
        return Err(DossierError::config(format!(
            "database directory {} does not exist",
            db_dir.display()
        )));
    }

    let mut available: BTreeMap<String, DatabaseTarget> = BTreeMap::new();
    for entry in std::fs::read_dir(db_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(db_path) = DB_EXTENSIONS
            .iter()
            .map(|ext| entry.path().join(format!("{}.{}", name, ext)))
            .find(|p| p.exists())
        else {
            tracing::debug!("no database file under {}, skipping", entry.path().display());
            continue;
        };
        let schema_path = Some(entry.path().join("schema.sql")).filter(|p| p.exists());
        available.insert(name.clone(), DatabaseTarget { name, db_path, schema_path });
    }

    if let Some(only) = only {
        return match available.remove(only) {
            Some(target) => Ok(vec![target]),
            None => Err(DossierError::config(format!(
                "database {} not found under {}",
                only,
                db_dir.display()
            ))),
        };
    }

    if let Some(allowed) = allowed {
        let mut targets = Vec::new();
        for name in allowed {
            if let Some(target) = available.remove(name) {
                targets.push(target);
            } else {
                tracing::warn!("dev file references missing database {}", name);
            }
        }
        return Ok(targets);
    }

    Ok(available.into_values().collect())
}

/// Pull the ordered, deduplicated `db_id` list out of a spider dev file
pub fn read_dev_file_db_ids(path: &Path) -> DossierResult<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct DevRecord {
        db_id: String,
    }

    let text = std::fs::read_to_string(path)?;
    let records: Vec<DevRecord> = serde_json::from_str(&text)
        .map_err(|e| DossierError::parse(format!("dev file {}: {}", path.display(), e)))?;

    let mut seen = std::collections::BTreeSet::new();
    Ok(records
        .into_iter()
        .map(|r| r.db_id)
        .filter(|id| seen.insert(id.clone()))
        .collect())
}
