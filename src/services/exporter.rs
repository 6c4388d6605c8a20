// Prompt Exporter
// Purpose: render a dossier as a compact or verbose prompt for the
// downstream SQL-generation pipeline, plus a cross-table quality summary
// that surfaces join-corrupting defects even when a per-table detail
// block was omitted.
//
// Rendering is a pure function of the dossier: no clock reads, no I/O.

use crate::models::{
    is_reserved_context_key, Dossier, IssueType, QualityIssue, SqlOp, TableRecord,
};

/// Business-note keys that duplicate profiler output and stay out of exports
fn is_exportable_note_key(key: &str) -> bool {
    !is_reserved_context_key(key) && !key.contains("quality_issue") && !key.contains("orphan_issue")
}

/// Verbose Markdown rendering - one section per table
pub fn render_verbose(dossier: &Dossier) -> String {
    let mut out = format!(
        "# Database: {} ({})\n\nCollected: {}\nTables: {}\n",
        dossier.database,
        dossier.dialect,
        dossier.collected_at.to_rfc3339(),
        dossier.tables.len()
    );

    if let Some(er) = &dossier.er_diagram {
        out.push_str("\n## ER Diagram\n\n```\n");
        out.push_str(er);
        out.push_str("```\n");
    }

    let summary = cross_table_quality_summary(dossier);
    if !summary.is_empty() {
        out.push_str("\n## Cross-table Quality Summary\n\n");
        out.push_str(&summary);
    }

    for record in dossier.tables.values() {
        out.push_str(&format!("\n## Table: {}\n\n", record.name));
        out.push_str(&format!(
            "Rows: {} | Columns: {} | Primary key: {}\n",
            record.row_count,
            record.columns.len(),
            if record.primary_key.is_empty() {
                "(none)".to_string()
            } else {
                record.primary_key.join(", ")
            }
        ));
        if let Some(description) = &record.description {
            out.push_str(&format!("\n{}\n", description));
        }

        if !record.quality_issues.is_empty() {
            out.push_str("\n### Data Quality Issues\n\n");
            for issue in &record.quality_issues {
                out.push_str(&render_issue_line(issue));
            }
        }

        let notes: Vec<_> = record
            .rich_context
            .iter()
            .filter(|(key, _)| is_exportable_note_key(key))
            .collect();
        if !notes.is_empty() {
            out.push_str("\n### Business Notes\n\n");
            for (key, note) in notes {
                out.push_str(&format!("- {}: {}\n", key, note.content));
            }
        }

        out.push_str("\n### Columns\n\n");
        out.push_str("| name | type | nullable | default | stats |\n");
        out.push_str("|---|---|---|---|---|\n");
        for col in &record.columns {
            let stats = col
                .value_stats
                .as_ref()
                .map(|s| {
                    let mut parts = vec![
                        format!("distinct={}", s.distinct_count),
                        format!("null={:.1}%", s.null_percent),
                    ];
                    if let Some(empty) = s.empty_count.filter(|&n| n > 0) {
                        parts.push(format!("empty={}", empty));
                    }
                    if let Some(range) = &s.range {
                        parts.push(format!(
                            "range={}..{} avg={}",
                            format_num(range.min),
                            format_num(range.max),
                            format_num(range.avg)
                        ));
                    }
                    parts.join(" ")
                })
                .unwrap_or_default();
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                col.name,
                col.data_type,
                if col.nullable { "yes" } else { "no" },
                col.default_value.as_deref().unwrap_or(""),
                stats
            ));
        }

        if !record.indexes.is_empty() {
            out.push_str("\n### Indexes\n\n");
            for index in &record.indexes {
                out.push_str(&format!(
                    "- {}{}{}\n",
                    index.name,
                    if index.unique { " (unique)" } else { "" },
                    if index.columns.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", index.columns.join(", "))
                    }
                ));
            }
        }

        if !record.foreign_keys.is_empty() {
            out.push_str("\n### Foreign Keys\n\n");
            for fk in &record.foreign_keys {
                out.push_str(&format!("- {} -> {}.{}\n", fk.column, fk.ref_table, fk.ref_column));
            }
        }
    }

    out
}

/// Compact rendering - one line per column
pub fn render_compact(dossier: &Dossier) -> String {
    let mut out = format!("Database: {} ({})\n", dossier.database, dossier.dialect);

    for record in dossier.tables.values() {
        out.push_str(&format!("\n### {} ({} rows)\n", record.name, record.row_count));
        for col in &record.columns {
            out.push_str(&render_compact_column(record, col));
        }

        if !record.quality_issues.is_empty() {
            out.push_str("\u{26a0}\u{fe0f} Data Quality Issues\n");
            for issue in &record.quality_issues {
                out.push_str(&render_issue_line(issue));
            }
        }

        let notes: Vec<_> = record
            .rich_context
            .iter()
            .filter(|(key, _)| is_exportable_note_key(key))
            .collect();
        if !notes.is_empty() {
            out.push_str("Business Notes\n");
            for (key, note) in notes {
                out.push_str(&format!("- {}: {}\n", key, note.content));
            }
        }
    }

    let summary = cross_table_quality_summary(dossier);
    if !summary.is_empty() {
        out.push_str("\n\u{26a0}\u{fe0f} Cross-table Quality Summary\n");
        out.push_str(&summary);
    }

    out
}

fn render_compact_column(record: &TableRecord, col: &crate::models::Column) -> String {
    let mut line = format!("- {}: {}", col.name, col.data_type.to_uppercase());
    if col.primary_key {
        line.push_str(" [PK]");
    }
    if let Some(fk) = record.foreign_keys.iter().find(|fk| fk.column == col.name) {
        line.push_str(&format!(" \u{2192} {}.{}", fk.ref_table, fk.ref_column));
    }
    if let Some(stats) = &col.value_stats {
        if let Some(top) = &stats.top_values {
            let rendered: Vec<String> =
                top.iter().map(|t| format!("{}({})", t.value, t.count)).collect();
            line.push_str(&format!(" values=[{}]", rendered.join(", ")));
        }
        if let Some(range) = &stats.range {
            line.push_str(&format!(
                " | range=[{}..{}]",
                format_num(range.min),
                format_num(range.max)
            ));
        }
    }
    line.push('\n');
    line
}

/// Cross-table correctness risks: every orphan, plus whitespace and
/// type-mismatch issues whose affected operations include JOIN.
pub fn cross_table_quality_summary(dossier: &Dossier) -> String {
    let mut out = String::new();
    for record in dossier.tables.values() {
        for issue in &record.quality_issues {
            let bubbles_up = match issue.issue_type {
                IssueType::Orphan => true,
                IssueType::Whitespace | IssueType::TypeMismatch => {
                    issue.affected_ops.contains(&SqlOp::Join)
                }
                _ => false,
            };
            if bubbles_up {
                out.push_str(&render_issue_line(issue));
            }
        }
    }
    out
}

fn render_issue_line(issue: &QualityIssue) -> String {
    let ops: Vec<&str> = issue.affected_ops.iter().map(|op| op.as_str()).collect();
    let mut line = format!(
        "- [{}] {} on {}.{}: {} (fix: {})",
        issue.severity.as_str(),
        issue.issue_type.as_str(),
        issue.table,
        issue.column,
        issue.description,
        issue.sql_fix
    );
    if !ops.is_empty() {
        line.push_str(&format!(" affects: {}", ops.join(", ")));
    }
    if !issue.examples.is_empty() {
        let quoted: Vec<String> =
            issue.examples.iter().map(|e| format!("{:?}", e)).collect();
        line.push_str(&format!(" examples: {}", quoted.join(", ")));
    }
    line.push('\n');
    line
}

/// Integer-valued floats render without the trailing `.0`
fn format_num(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;

    fn sample_dossier() -> Dossier {
        let mut dossier = Dossier::new("concert_singer", Dialect::Sqlite);

        let mut singer = TableRecord::new("singer");
        singer.row_count = 2;
        singer.primary_key = vec!["id".into()];
        singer.columns = vec![
            Column {
                name: "id".into(),
                data_type: "INTEGER".into(),
                nullable: false,
                default_value: None,
                primary_key: true,
                value_stats: None,
            },
            Column {
                name: "name".into(),
                data_type: "TEXT".into(),
                nullable: true,
                default_value: None,
                primary_key: false,
                value_stats: Some(ValueStats {
                    distinct_count: 2,
                    null_count: 0,
                    null_percent: 0.0,
                    empty_count: Some(0),
                    top_values: Some(vec![
                        TopValue { value: "Adele".into(), count: 1, percent: 50.0 },
                        TopValue { value: " Beyoncé ".into(), count: 1, percent: 50.0 },
                    ]),
                    range: None,
                }),
            },
            Column {
                name: "age".into(),
                data_type: "INT".into(),
                nullable: true,
                default_value: None,
                primary_key: false,
                value_stats: Some(ValueStats {
                    distinct_count: 2,
                    null_count: 0,
                    null_percent: 0.0,
                    empty_count: None,
                    top_values: None,
                    range: Some(NumericRange { min: 34.0, max: 41.0, avg: 37.5 }),
                }),
            },
        ];
        singer.quality_issues = vec![QualityIssue {
            table: "singer".into(),
            column: "name".into(),
            issue_type: IssueType::Whitespace,
            severity: Severity::Critical,
            description: "whitespace in values".into(),
            sql_fix: "TRIM(\"name\")".into(),
            affected_ops: vec![SqlOp::Join, SqlOp::Where, SqlOp::GroupBy],
            examples: vec![" Beyoncé ".into()],
        }];
        singer.rich_context.insert("status_values".into(), BusinessNote::new("S=scheduled"));
        singer.rich_context.insert("singer_columns".into(), BusinessNote::new("reserved"));
        singer
            .rich_context
            .insert("llm_quality_issues".into(), BusinessNote::new("duplicates profiler"));
        singer
            .rich_context
            .insert("orphan_issue_notes".into(), BusinessNote::new("duplicates profiler"));
        dossier.tables.insert("singer".into(), singer);

        let mut concert = TableRecord::new("concert");
        concert.row_count = 2;
        concert.columns = vec![Column {
            name: "singer_id".into(),
            data_type: "INTEGER".into(),
            nullable: true,
            default_value: None,
            primary_key: false,
            value_stats: None,
        }];
        concert.foreign_keys = vec![ForeignKey {
            column: "singer_id".into(),
            ref_table: "singer".into(),
            ref_column: "id".into(),
        }];
        concert.quality_issues = vec![QualityIssue {
            table: "concert".into(),
            column: "singer_id".into(),
            issue_type: IssueType::Orphan,
            severity: Severity::Warning,
            description: "1 orphaned reference".into(),
            sql_fix: "LEFT JOIN \"singer\" ON ...".into(),
            affected_ops: vec![SqlOp::Join],
            examples: vec![],
        }];
        dossier.tables.insert("concert".into(), concert);

        dossier
    }

    #[test]
    fn verbose_includes_structure_and_filters_notes() {
        let text = render_verbose(&sample_dossier());
        assert!(text.contains("## Table: singer"));
        assert!(text.contains("| name | TEXT"));
        assert!(text.contains("- status_values: S=scheduled"));
        // reserved and duplicating keys stay out
        assert!(!text.contains("singer_columns"));
        assert!(!text.contains("llm_quality_issues"));
        assert!(!text.contains("orphan_issue_notes"));
    }

    #[test]
    fn compact_renders_column_lines() {
        let text = render_compact(&sample_dossier());
        assert!(text.contains("- id: INTEGER [PK]"));
        assert!(text.contains("- singer_id: INTEGER \u{2192} singer.id"));
        assert!(text.contains("values=[ Beyoncé (1), Adele(1)]") || text.contains("values=[Adele(1),  Beyoncé (1)]"));
        assert!(text.contains("range=[34..41]"));
        assert!(text.contains("\u{26a0}\u{fe0f} Data Quality Issues"));
        assert!(!text.contains("singer_columns"));
    }

    #[test]
    fn cross_table_summary_surfaces_join_risks() {
        let summary = cross_table_quality_summary(&sample_dossier());
        assert!(summary.contains("orphan on concert.singer_id"));
        assert!(summary.contains("whitespace on singer.name"));
    }

    #[test]
    fn export_is_pure() {
        let dossier = sample_dossier();
        assert_eq!(render_verbose(&dossier), render_verbose(&dossier));
        assert_eq!(render_compact(&dossier), render_compact(&dossier));
    }
}
