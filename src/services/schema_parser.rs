// Schema Parser
// Purpose: Parse a DDL script into a seed skeleton of tables, columns,
// primary keys and foreign keys.
//
// The parser is deliberately forgiving: it handles the three identifier
// quote styles ("x", `x`, [x]), nested parentheses inside column types,
// line and block comments, column- and table-level PRIMARY KEY / FOREIGN
// KEY clauses, and IF NOT EXISTS. Anything it cannot make sense of fails
// the statement, not the pipeline; live discovery fills the gaps.

use crate::models::{Column, ForeignKey, TableRecord};
use crate::utils::error::{DossierError, DossierResult};

/// Parse a DDL script into seed table skeletons.
///
/// Table names are lowercased for lookup; column names keep their case.
pub fn parse_ddl(ddl: &str) -> DossierResult<Vec<TableRecord>> {
    let stripped = strip_comments(ddl);
    let mut tables = Vec::new();
    let mut cursor = Cursor::new(&stripped);

    while let Some(start) = cursor.find_keyword("CREATE") {
        cursor.pos = start;
        cursor.eat_word(); // CREATE
        // TEMP/TEMPORARY qualifier
        if cursor.peek_word_eq("TEMP") || cursor.peek_word_eq("TEMPORARY") {
            cursor.eat_word();
        }
        if !cursor.peek_word_eq("TABLE") {
            continue; // CREATE INDEX / VIEW / TRIGGER
        }
        cursor.eat_word(); // TABLE

        if cursor.peek_word_eq("IF") {
            cursor.eat_word();
            if !cursor.peek_word_eq("NOT") {
                return Err(DossierError::parse("expected NOT after IF in CREATE TABLE"));
            }
            cursor.eat_word();
            if !cursor.peek_word_eq("EXISTS") {
                return Err(DossierError::parse("expected EXISTS after IF NOT"));
            }
            cursor.eat_word();
        }

        let mut name = cursor
            .read_identifier()
            .ok_or_else(|| DossierError::parse("missing table name in CREATE TABLE"))?;
        // schema-qualified names keep only the table part
        while cursor.peek_char() == Some('.') {
            cursor.pos += 1;
            name = cursor
                .read_identifier()
                .ok_or_else(|| DossierError::parse("missing identifier after '.'"))?;
        }

        let body = match cursor.read_balanced_parens() {
            Some(body) => body,
            None => continue, // CREATE TABLE ... AS SELECT, or malformed
        };

        let mut table = TableRecord::new(name.to_lowercase());
        parse_table_body(&body, &mut table)?;
        tables.push(table);
    }

    Ok(tables)
}

fn parse_table_body(body: &str, table: &mut TableRecord) -> DossierResult<()> {
    for item in split_top_level(body) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        let mut cursor = Cursor::new(item);
        // CONSTRAINT <name> prefixes a table-level clause
        if cursor.peek_word_eq("CONSTRAINT") {
            cursor.eat_word();
            cursor.read_identifier();
        }

        if cursor.peek_word_eq("PRIMARY") {
            cursor.eat_word();
            cursor.eat_word(); // KEY
            if let Some(cols) = cursor.read_balanced_parens() {
                table.primary_key = split_top_level(&cols)
                    .iter()
                    .filter_map(|c| identifier_of(c))
                    .collect();
                for pk in table.primary_key.clone() {
                    if let Some(col) = table.columns.iter_mut().find(|c| c.name == pk) {
                        col.primary_key = true;
                    }
                }
            }
        } else if cursor.peek_word_eq("FOREIGN") {
            cursor.eat_word();
            cursor.eat_word(); // KEY
            let local: Vec<String> = cursor
                .read_balanced_parens()
                .map(|cols| split_top_level(&cols).iter().filter_map(|c| identifier_of(c)).collect())
                .unwrap_or_default();
            if !cursor.peek_word_eq("REFERENCES") {
                return Err(DossierError::parse(format!(
                    "FOREIGN KEY without REFERENCES in table {}",
                    table.name
                )));
            }
            cursor.eat_word();
            let ref_table = cursor
                .read_identifier()
                .ok_or_else(|| DossierError::parse("missing referenced table"))?
                .to_lowercase();
            let referenced: Vec<String> = cursor
                .read_balanced_parens()
                .map(|cols| split_top_level(&cols).iter().filter_map(|c| identifier_of(c)).collect())
                .unwrap_or_default();
            for (i, col) in local.iter().enumerate() {
                table.foreign_keys.push(ForeignKey {
                    column: col.clone(),
                    ref_table: ref_table.clone(),
                    ref_column: referenced.get(i).cloned().unwrap_or_default(),
                });
            }
        } else if cursor.peek_word_eq("UNIQUE")
            || cursor.peek_word_eq("CHECK")
            || cursor.peek_word_eq("KEY")
            || cursor.peek_word_eq("INDEX")
        {
            // table-level constraints we do not model in the seed
        } else {
            parse_column_def(item, table)?;
        }
    }
    Ok(())
}

fn parse_column_def(item: &str, table: &mut TableRecord) -> DossierResult<()> {
    let mut cursor = Cursor::new(item);
    let name = cursor
        .read_identifier()
        .ok_or_else(|| DossierError::parse(format!("missing column name in table {}", table.name)))?;

    // type: words plus attached parenthesized arguments, until a constraint keyword
    const CONSTRAINT_KEYWORDS: [&str; 10] = [
        "NOT", "NULL", "PRIMARY", "DEFAULT", "REFERENCES", "UNIQUE", "CHECK", "COLLATE",
        "GENERATED", "CONSTRAINT",
    ];
    let mut data_type = String::new();
    loop {
        cursor.skip_ws();
        if cursor.peek_char() == Some('(') {
            let args = cursor.read_balanced_parens().unwrap_or_default();
            data_type.push('(');
            data_type.push_str(&args);
            data_type.push(')');
            continue;
        }
        let Some(word) = cursor.peek_word() else { break };
        if CONSTRAINT_KEYWORDS.iter().any(|k| word.eq_ignore_ascii_case(k)) {
            break;
        }
        cursor.eat_word();
        if !data_type.is_empty() {
            data_type.push(' ');
        }
        data_type.push_str(&word);
    }

    let mut column = Column {
        name: name.clone(),
        data_type,
        nullable: true,
        default_value: None,
        primary_key: false,
        value_stats: None,
    };

    while let Some(word) = cursor.peek_word() {
        let upper = word.to_ascii_uppercase();
        match upper.as_str() {
            "NOT" => {
                cursor.eat_word();
                if cursor.peek_word_eq("NULL") {
                    cursor.eat_word();
                    column.nullable = false;
                }
            }
            "NULL" => {
                cursor.eat_word();
            }
            "PRIMARY" => {
                cursor.eat_word();
                if cursor.peek_word_eq("KEY") {
                    cursor.eat_word();
                }
                column.primary_key = true;
                column.nullable = false;
                if !table.primary_key.contains(&name) {
                    table.primary_key.push(name.clone());
                }
            }
            "AUTOINCREMENT" | "AUTO_INCREMENT" | "UNIQUE" => {
                cursor.eat_word();
            }
            "DEFAULT" => {
                cursor.eat_word();
                column.default_value = cursor.read_value_token();
            }
            "COLLATE" => {
                cursor.eat_word();
                cursor.eat_word();
            }
            "CHECK" => {
                cursor.eat_word();
                cursor.read_balanced_parens();
            }
            "REFERENCES" => {
                cursor.eat_word();
                if let Some(ref_table) = cursor.read_identifier() {
                    let ref_column = cursor
                        .read_balanced_parens()
                        .and_then(|cols| split_top_level(&cols).first().and_then(|c| identifier_of(c)))
                        .unwrap_or_default();
                    table.foreign_keys.push(ForeignKey {
                        column: name.clone(),
                        ref_table: ref_table.to_lowercase(),
                        ref_column,
                    });
                }
                // ON DELETE / ON UPDATE actions
                while cursor.peek_word_eq("ON") {
                    cursor.eat_word();
                    cursor.eat_word();
                    cursor.eat_word();
                }
            }
            _ => {
                cursor.eat_word();
            }
        }
    }

    table.columns.push(column);
    Ok(())
}

/// First identifier of a fragment, unquoted
fn identifier_of(fragment: &str) -> Option<String> {
    Cursor::new(fragment.trim()).read_identifier()
}

// ============================================================================
// Lexing helpers
// ============================================================================

/// Remove -- and /* */ comments, preserving string literals
fn strip_comments(ddl: &str) -> String {
    let chars: Vec<char> = ddl.chars().collect();
    let mut out = String::with_capacity(ddl.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' | '`' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == c {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '[' => {
                out.push(c);
                i += 1;
                while i < chars.len() {
                    out.push(chars[i]);
                    if chars[i] == ']' {
                        i += 1;
                        break;
                    }
                    i += 1;
                }
            }
            '-' if chars.get(i + 1) == Some(&'-') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
                out.push(' ');
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }
    out
}

/// Split a parenthesized body at top-level commas (quotes and nesting aware)
fn split_top_level(body: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in body.chars() {
        if let Some(q) = quote {
            current.push(c);
            let closes = if q == '[' { c == ']' } else { c == q };
            if closes {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' | '`' | '[' => {
                quote = Some(c);
                current.push(c);
            }
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    source: &'a str,
}

impl<'a> Cursor<'a> {
    fn new(source: &'a str) -> Self {
        Self { chars: source.chars().collect(), pos: 0, source }
    }

    fn skip_ws(&mut self) {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
    }

    fn peek_char(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    /// Next bare word without consuming it
    fn peek_word(&mut self) -> Option<String> {
        self.skip_ws();
        let mut end = self.pos;
        while end < self.chars.len()
            && (self.chars[end].is_alphanumeric() || self.chars[end] == '_')
        {
            end += 1;
        }
        if end == self.pos { None } else { Some(self.chars[self.pos..end].iter().collect()) }
    }

    fn peek_word_eq(&mut self, keyword: &str) -> bool {
        self.peek_word().is_some_and(|w| w.eq_ignore_ascii_case(keyword))
    }

    fn eat_word(&mut self) -> Option<String> {
        let word = self.peek_word()?;
        self.pos += word.chars().count();
        Some(word)
    }

    /// Read a possibly-quoted identifier ("x", `x`, [x], or bare)
    fn read_identifier(&mut self) -> Option<String> {
        self.skip_ws();
        let c = *self.chars.get(self.pos)?;
        let close = match c {
            '"' => '"',
            '`' => '`',
            '[' => ']',
            _ => {
                return self.eat_word();
            }
        };
        self.pos += 1;
        let mut out = String::new();
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.pos += 1;
            if c == close {
                // doubled closing quote escapes itself
                if self.chars.get(self.pos) == Some(&close) && close != ']' {
                    out.push(close);
                    self.pos += 1;
                    continue;
                }
                return Some(out);
            }
            out.push(c);
        }
        Some(out)
    }

    /// Consume a balanced `( ... )` group, returning the inner text
    fn read_balanced_parens(&mut self) -> Option<String> {
        self.skip_ws();
        if self.chars.get(self.pos) != Some(&'(') {
            return None;
        }
        self.pos += 1;
        let mut depth = 1usize;
        let mut out = String::new();
        let mut quote: Option<char> = None;
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            self.pos += 1;
            if let Some(q) = quote {
                out.push(c);
                let closes = if q == '[' { c == ']' } else { c == q };
                if closes {
                    quote = None;
                }
                continue;
            }
            match c {
                '\'' | '"' | '`' | '[' => {
                    quote = Some(c);
                    out.push(c);
                }
                '(' => {
                    depth += 1;
                    out.push(c);
                }
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(out);
                    }
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        Some(out)
    }

    /// Read a DEFAULT value token: string, number, keyword, or (expr)
    fn read_value_token(&mut self) -> Option<String> {
        self.skip_ws();
        match self.chars.get(self.pos)? {
            '\'' => {
                self.pos += 1;
                let mut out = String::new();
                while self.pos < self.chars.len() {
                    let c = self.chars[self.pos];
                    self.pos += 1;
                    if c == '\'' {
                        if self.chars.get(self.pos) == Some(&'\'') {
                            out.push('\'');
                            self.pos += 1;
                            continue;
                        }
                        break;
                    }
                    out.push(c);
                }
                Some(out)
            }
            '(' => self.read_balanced_parens().map(|e| format!("({})", e)),
            _ => {
                let mut end = self.pos;
                while end < self.chars.len()
                    && !self.chars[end].is_whitespace()
                    && !matches!(self.chars[end], ',' | ')')
                {
                    end += 1;
                }
                let token: String = self.chars[self.pos..end].iter().collect();
                self.pos = end;
                if token.is_empty() { None } else { Some(token) }
            }
        }
    }

    /// Position of the next occurrence of `keyword` at a word boundary
    fn find_keyword(&self, keyword: &str) -> Option<usize> {
        let lower = self.source.to_lowercase();
        let needle = keyword.to_lowercase();
        let mut search_from = self.char_byte_offset();
        loop {
            let byte_pos = lower[search_from..].find(&needle)? + search_from;
            let before_ok = byte_pos == 0
                || !lower[..byte_pos].chars().next_back().is_some_and(|c| c.is_alphanumeric() || c == '_');
            let after = lower[byte_pos + needle.len()..].chars().next();
            let after_ok = !after.is_some_and(|c| c.is_alphanumeric() || c == '_');
            if before_ok && after_ok {
                return Some(self.source[..byte_pos].chars().count());
            }
            search_from = byte_pos + needle.len();
        }
    }

    fn char_byte_offset(&self) -> usize {
        self.source.char_indices().nth(self.pos).map(|(b, _)| b).unwrap_or(self.source.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_schema() {
        let ddl = r#"
            CREATE TABLE singer (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                age INT
            );
            CREATE TABLE concert (
                id INTEGER PRIMARY KEY,
                singer_id INTEGER REFERENCES singer(id)
            );
        "#;
        let tables = parse_ddl(ddl).unwrap();
        assert_eq!(tables.len(), 2);

        let singer = &tables[0];
        assert_eq!(singer.name, "singer");
        assert_eq!(singer.primary_key, vec!["id"]);
        assert_eq!(singer.columns.len(), 3);
        assert!(!singer.columns[1].nullable);
        assert!(singer.columns[2].nullable);

        let concert = &tables[1];
        assert_eq!(
            concert.foreign_keys,
            vec![ForeignKey {
                column: "singer_id".into(),
                ref_table: "singer".into(),
                ref_column: "id".into()
            }]
        );
    }

    #[test]
    fn handles_quotes_comments_and_if_not_exists() {
        let ddl = r#"
            -- line comment with CREATE TABLE noise
            /* block
               comment */
            CREATE TABLE IF NOT EXISTS "Order Items" (
                `item id` INTEGER,
                [unit price] DECIMAL(10,2) DEFAULT 0.0, -- trailing comment
                note VARCHAR(40) DEFAULT 'has -- dashes',
                PRIMARY KEY (`item id`)
            );
        "#;
        let tables = parse_ddl(ddl).unwrap();
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.name, "order items");
        assert_eq!(t.primary_key, vec!["item id"]);
        assert_eq!(t.columns[1].data_type, "DECIMAL(10,2)");
        assert_eq!(t.columns[1].default_value.as_deref(), Some("0.0"));
        assert_eq!(t.columns[2].default_value.as_deref(), Some("has -- dashes"));
        assert!(t.columns[0].primary_key);
    }

    #[test]
    fn table_level_composite_foreign_key() {
        let ddl = r#"
            CREATE TABLE link (
                a INTEGER,
                b INTEGER,
                CONSTRAINT fk_link FOREIGN KEY (a, b) REFERENCES target (x, y) ON DELETE CASCADE
            );
        "#;
        let tables = parse_ddl(ddl).unwrap();
        let fks = &tables[0].foreign_keys;
        assert_eq!(fks.len(), 2);
        assert_eq!(fks[0].column, "a");
        assert_eq!(fks[0].ref_table, "target");
        assert_eq!(fks[0].ref_column, "x");
        assert_eq!(fks[1].ref_column, "y");
    }

    #[test]
    fn table_names_lowercased_column_case_kept() {
        let ddl = "CREATE TABLE Stadium (Stadium_ID INTEGER PRIMARY KEY, Name TEXT);";
        let tables = parse_ddl(ddl).unwrap();
        assert_eq!(tables[0].name, "stadium");
        assert_eq!(tables[0].columns[0].name, "Stadium_ID");
    }

    #[test]
    fn create_index_statements_are_skipped() {
        let ddl = r#"
            CREATE INDEX idx_name ON singer (name);
            CREATE TABLE t (id INTEGER);
        "#;
        let tables = parse_ddl(ddl).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "t");
    }
}
