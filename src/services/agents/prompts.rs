// Agent prompts
// Purpose: verbatim prompt templates for the coordinator and worker loops.
// The mandated workflow wording matters: the exploration quality of the
// model tracks how explicitly the steps are spelled out.

use crate::models::{Dialect, TableRecord};

// ============================================================================
// Coordinator
// ============================================================================

pub const COORDINATOR_SYSTEM: &str = "You are the coordinator of a database analysis pipeline. \
Your only job is to discover every table in the connected database. \
Query the system catalog with the execute_sql tool; analysis work for each discovered table \
is registered automatically when the discovery result is observed. \
Do not analyze any table yourself.";

pub fn coordinator_task(dialect: Dialect) -> String {
    format!(
        "The database speaks the {} dialect. Run this discovery query:\n\n{}\n\n\
         When you have seen the table list, reply with a Final Answer stating how many tables exist.",
        dialect.as_str(),
        dialect.discovery_sql()
    )
}

// ============================================================================
// Worker phase 1 - basic metadata
// ============================================================================

pub const WORKER_PHASE1_SYSTEM: &str = "You are a database analyst collecting the basic metadata of one table. \
Run exactly the four queries you are given, one per step, using the execute_sql tool. \
Run them verbatim - do not rewrite them and do not add queries of your own. \
The results are collected automatically as you go.";

pub fn worker_phase1_task(dialect: Dialect, table: &str) -> String {
    format!(
        "Collect the metadata of table '{table}'. Run these four queries, one Action per query, in this order:\n\n\
         1. {columns}\n\
         2. {indexes}\n\
         3. {rowcount}\n\
         4. {fks}\n\n\
         After the fourth Observation, reply with a Final Answer of one line confirming completion.",
        columns = dialect.columns_sql(table),
        indexes = dialect.indexes_sql(table),
        rowcount = dialect.row_count_sql(table),
        fks = dialect.foreign_keys_sql(table),
    )
}

// ============================================================================
// Worker phase 2 - rich context exploration
// ============================================================================

pub const WORKER_PHASE2_SYSTEM: &str = "You are a data-quality and business analyst exploring one database table. \
You investigate with read-only SQL and record durable findings as business notes.\n\
\n\
Follow this workflow, in order:\n\
1. For every TEXT column, check whether any values carry leading or trailing whitespace \
(compare the value with TRIM of the value).\n\
2. For every TEXT column, check whether the stored values look numeric.\n\
3. For every foreign key, check for orphaned references (child values missing from the parent table).\n\
4. Look at low-cardinality columns and record their value sets as enumerations.\n\
5. Record any business rules you can infer from the data.\n\
\n\
Record each finding with the set_rich_context tool. Its input is 'key|value' - a short snake_case key, \
a pipe, then the note text. Good keys look like status_values, date_format, business_rules. \
Never use keys ending in _columns, _indexes, _rowcount or _foreignkeys; those are reserved.";

pub fn worker_phase2_task(record: &TableRecord) -> String {
    let mut out = format!(
        "Explore table '{}' ({} rows).\n\nColumns:\n",
        record.name, record.row_count
    );
    for col in &record.columns {
        out.push_str(&format!(
            "- {} {}{}\n",
            col.name,
            col.data_type,
            if col.primary_key { " [PK]" } else { "" }
        ));
    }
    if record.foreign_keys.is_empty() {
        out.push_str("\nNo foreign keys.\n");
    } else {
        out.push_str("\nForeign keys:\n");
        for fk in &record.foreign_keys {
            out.push_str(&format!("- {} -> {}.{}\n", fk.column, fk.ref_table, fk.ref_column));
        }
    }
    out.push_str(
        "\nWork through the workflow, then give a Final Answer summarizing what you recorded.",
    );
    out
}

// ============================================================================
// Worker phase 3 - description
// ============================================================================

pub const DESCRIPTION_SYSTEM: &str =
    "You write one-sentence descriptions of database tables for a SQL-generation assistant. \
     Reply with the sentence only - no preamble, no markdown.";

pub fn description_task(record: &TableRecord) -> String {
    let mut out = format!(
        "Table '{}' has {} rows and {} columns ({}).",
        record.name,
        record.row_count,
        record.columns.len(),
        record
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if !record.rich_context.is_empty() {
        out.push_str("\nKnown business notes:\n");
        for (key, note) in &record.rich_context {
            out.push_str(&format!("- {}: {}\n", key, note.content));
        }
    }
    out.push_str("\nState the purpose of this table in one sentence.");
    out
}
