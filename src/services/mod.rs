pub mod agents;
pub mod dossier_store;
pub mod executor;
pub mod exporter;
pub mod llm;
pub mod orchestrator;
pub mod profiler;
pub mod schema_parser;

pub use agents::{Coordinator, Worker, COORDINATOR_MAX_STEPS, WORKER_MAX_STEPS};
pub use dossier_store::{classify_probe, DossierStore, TempKind};
pub use executor::{
    connect_mysql, connect_sqlite, is_discovery_sql, MySqlExecutor, QueryExecutor, QueryResult,
    SqliteExecutor,
};
pub use exporter::{cross_table_quality_summary, render_compact, render_verbose};
pub use llm::{ChatMessage, LlmClient, LlmError, LlmProvider, Reasoner};
pub use orchestrator::{
    discover_targets, read_dev_file_db_ids, BatchSummary, DatabaseOutcome, DatabaseStatus,
    DatabaseTarget, Orchestrator, OrchestratorOptions,
};
pub use profiler::Profiler;
pub use schema_parser::parse_ddl;
