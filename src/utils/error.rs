use thiserror::Error;

/// Pipeline error with rich context and automatic error trait implementations
///
/// Design: Uses thiserror for ergonomic error handling with context.
/// Each variant carries meaningful context to help with debugging.
#[derive(Error, Debug)]
pub enum DossierError {
    // Configuration errors - fatal at the boundary
    #[error("Configuration error: {0}")]
    Config(String),

    // Query errors - returned to the caller as an observation, never halt a phase
    #[error("Query failed: {message} (sql: {sql})")]
    Query { sql: String, message: String },

    // DDL or result-shape parsing failed - logged, downstream falls back to live discovery
    #[error("Parse error: {0}")]
    Parse(String),

    // LLM call failed or reasoning loop exceeded its iteration bound
    #[error("Agent error: {0}")]
    Agent(String),

    // Illegal task-state transition or unknown table reference - a programming bug
    #[error("Illegal state: {0}")]
    IllegalState(String),

    // File read/write - fatal for the affected database only
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic wrapper for other errors - auto-convert from anyhow::Error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DossierError {
    /// Helper to create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Helper to create a query error
    pub fn query(sql: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query { sql: sql.into(), message: message.into() }
    }

    /// Helper to create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Helper to create an agent error
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent(message.into())
    }

    /// Helper to create an illegal-state error
    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }

    /// Whether the error must abort the whole database run
    pub fn is_fatal_for_database(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Io(_))
    }

    /// One-line message truncated for the batch summary
    pub fn summary_message(&self, max_len: usize) -> String {
        let msg = self.to_string().replace('\n', " ");
        if msg.len() > max_len {
            let cut = msg
                .char_indices()
                .take_while(|(i, _)| *i < max_len)
                .last()
                .map(|(i, c)| i + c.len_utf8())
                .unwrap_or(0);
            format!("{}...", &msg[..cut])
        } else {
            msg
        }
    }
}

pub type DossierResult<T> = Result<T, DossierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_error_carries_sql() {
        let err = DossierError::query("SELECT 1", "no such table");
        assert!(err.to_string().contains("SELECT 1"));
        assert!(err.to_string().contains("no such table"));
    }

    #[test]
    fn summary_message_truncates() {
        let err = DossierError::agent("x".repeat(300));
        let short = err.summary_message(80);
        assert!(short.len() <= 84);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn summary_message_flattens_newlines() {
        let err = DossierError::parse("line one\nline two");
        assert_eq!(err.summary_message(200), "Parse error: line one line two");
    }

    #[test]
    fn only_config_and_io_are_fatal() {
        assert!(DossierError::config("missing path").is_fatal_for_database());
        assert!(!DossierError::query("SELECT 1", "boom").is_fatal_for_database());
        assert!(!DossierError::agent("loop exceeded").is_fatal_for_database());
        assert!(!DossierError::illegal_state("bad transition").is_fatal_for_database());
    }

    #[test]
    fn io_and_json_errors_convert() {
        let io_err: DossierError =
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(io_err, DossierError::Io(_)));

        let json_err: DossierError =
            serde_json::from_str::<serde_json::Value>("{not json").unwrap_err().into();
        assert!(matches!(json_err, DossierError::Json(_)));
    }
}
