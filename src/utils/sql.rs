// SQL text helpers
// Purpose: identifier quoting and literal escaping for probe queries.
// Every user-supplied name is quoted; embedded quote characters are doubled.

use crate::models::Dialect;

/// Quote an identifier for the given dialect.
///
/// SQLite and Postgres use double quotes, MySQL uses backticks. The quote
/// character itself is escaped by doubling, so a hostile table name cannot
/// break out of the identifier position.
pub fn quote_ident(dialect: Dialect, name: &str) -> String {
    match dialect {
        Dialect::MySql => format!("`{}`", name.replace('`', "``")),
        Dialect::Sqlite | Dialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
    }
}

/// Escape a string literal (single quotes doubled).
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
