// Agents Module
// Purpose: LLM-driven coordination and per-table exploration on top of the
// bounded ReAct loop engine.

mod coordinator;
pub mod prompts;
mod react;
mod worker;

pub use coordinator::{Coordinator, COORDINATOR_MAX_STEPS};
pub use react::{ReactLoop, ReactOutcome, Tool};
pub use worker::{Worker, WORKER_MAX_STEPS};
