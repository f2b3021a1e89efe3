//! Terminal tables for command results.

use crate::app::duplicates::DuplicateReport;
use crate::app::merge_use_case::{MergeOutcome, MergeSummary};
use crate::pipeline::mapping::FieldMapping;
use crate::pipeline::selection::{record_label, FlatRecord};
use crate::pipeline::MigrationReport;
use crate::types::{ObjectInfo, Record};
use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use serde_json::Value;

/// Widest a preview cell gets before it is cut
const PREVIEW_CELL_CHARS: usize = 40;
const PREVIEW_COLUMNS: usize = 6;

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
    table.set_header(headers.iter().map(|h| header_cell(h)).collect::<Vec<_>>());
    table
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

pub fn objects_table(objects: &[ObjectInfo]) -> Table {
    let mut table = styled_table(&["API Slug", "Object ID", "Singular", "Plural"]);
    for object in objects {
        table.add_row(vec![
            Cell::new(&object.api_slug).add_attribute(Attribute::Bold),
            dim_cell(&object.object_id),
            Cell::new(object.singular_noun.as_deref().unwrap_or("-")),
            Cell::new(object.plural_noun.as_deref().unwrap_or("-")),
        ]);
    }
    table
}

/// First `rows` source records: label, id and the first scalar fields.
pub fn preview_table(records: &[FlatRecord], rows: usize) -> Table {
    let columns: Vec<String> = records
        .first()
        .map(|r| {
            r.iter()
                .filter(|(key, value)| key.as_str() != "id" && !value.is_object() && !value.is_array())
                .map(|(key, _)| key.clone())
                .take(PREVIEW_COLUMNS)
                .collect()
        })
        .unwrap_or_default();
    let mut headers = vec!["#", "Record", "ID"];
    headers.extend(columns.iter().map(String::as_str));
    let mut table = styled_table(&headers);
    for (i, record) in records.iter().take(rows).enumerate() {
        let mut cells = vec![
            dim_cell(i + 1),
            Cell::new(truncate(&record_label(record), PREVIEW_CELL_CHARS)),
            dim_cell(crate::pipeline::flatten::id_text(record.get("id"))),
        ];
        for column in &columns {
            let text = match record.get(column) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            cells.push(Cell::new(truncate(&text, PREVIEW_CELL_CHARS)));
        }
        table.add_row(cells);
    }
    table
}

pub fn mapping_table(mapping: &FieldMapping) -> Table {
    let mut table = styled_table(&["Source Field", "Attio Attribute"]);
    for (source, target) in &mapping.fields {
        table.add_row(vec![Cell::new(source), Cell::new(target).fg(Color::Green)]);
    }
    table
}

pub fn migration_table(report: &MigrationReport) -> Table {
    let mut table = styled_table(&["Metric", "Value"]);
    align_column(&mut table, 1, CellAlignment::Right);
    let mode = if report.dry_run { "dry run" } else { "live" };
    table.add_row(vec![Cell::new("Mode"), Cell::new(mode)]);
    table.add_row(vec![
        Cell::new("Objects"),
        Cell::new(format!("{} -> {}", report.source_object, report.target_object)),
    ]);
    table.add_row(vec![Cell::new("Selected"), Cell::new(report.selected)]);
    table.add_row(vec![Cell::new("Batches"), Cell::new(report.batches)]);
    table.add_row(vec![Cell::new("Successful"), count_cell(report.success, Color::Green)]);
    table.add_row(vec![Cell::new("Failed"), count_cell(report.errors, Color::Red)]);
    table.add_row(vec![Cell::new("Skipped"), count_cell(report.skipped, Color::Yellow)]);
    table.add_row(vec![
        Cell::new("Success Rate").add_attribute(Attribute::Bold),
        Cell::new(format!("{:.1}%", report.success_rate)).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn duplicates_table(report: &DuplicateReport) -> Table {
    let mut table = styled_table(&["Criterion", "Groups", "Records"]);
    align_column(&mut table, 1, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    for (criterion, groups) in &report.sections {
        let members: usize = groups.iter().map(|g| g.members.len()).sum();
        table.add_row(vec![
            Cell::new(criterion.section_title()),
            count_cell(groups.len(), Color::Yellow),
            Cell::new(members),
        ]);
    }
    table
}

pub fn merge_table(summary: &MergeSummary) -> Table {
    let mut table = styled_table(&["Object", "Key", "Kept", "Deleted", "Consolidated", "Outcome"]);
    align_column(&mut table, 3, CellAlignment::Right);
    for result in &summary.results {
        let color = match result.outcome {
            MergeOutcome::Merged { .. } => Color::Green,
            MergeOutcome::DeleteFailed { .. } | MergeOutcome::PatchFailed { .. } => Color::Red,
            MergeOutcome::Declined | MergeOutcome::Planned => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(&result.object),
            Cell::new(truncate(&result.key, PREVIEW_CELL_CHARS)),
            Cell::new(format!("{} ({})", result.kept, result.kept_name)),
            Cell::new(format!("{}/{}", result.outcome.deleted(), result.removed.len())),
            Cell::new(result.consolidated.join(", ")),
            Cell::new(result.outcome.label()).fg(color),
        ]);
    }
    table
}

pub fn records_table(records: &[Record]) -> Table {
    let mut table = styled_table(&["ID", "Name", "Emails", "Created"]);
    for record in records {
        table.add_row(vec![
            dim_cell(&record.id),
            Cell::new(record.display_name()),
            Cell::new(record.list(crate::constants::ATTR_EMAIL_ADDRESSES).join(", ")),
            Cell::new(
                record
                    .created_at
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_preview_skips_nested_columns() {
        let records: Vec<FlatRecord> = vec![json!({
            "id": "tw-1",
            "name": { "firstName": "Ada" },
            "name_full": "Ada",
            "city": "London"
        })]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect();
        let rendered = preview_table(&records, 5).to_string();
        assert!(rendered.contains("London"));
        assert!(rendered.contains("tw-1"));
        assert!(!rendered.contains("firstName"));
    }
}
