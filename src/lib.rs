//! Dossier Library
//!
//! Builds a rich-context dossier per relational database: schema,
//! statistical profile, data-quality defects, join topology and business
//! meaning, for consumption by NL-to-SQL pipelines.

pub mod config;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::{Benchmark, CommandLineArgs, Config, ExportFormat};
pub use models::{Dialect, Dossier, QualityIssue, TableRecord, TaskInfo, TaskStatus};
pub use services::{
    DossierStore, LlmClient, Orchestrator, OrchestratorOptions, Profiler, QueryExecutor, Reasoner,
};
pub use utils::{DossierError, DossierResult};
