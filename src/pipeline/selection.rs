use crate::app::ports::Prompter;
use crate::constants::MANUAL_SELECTION_LIMIT;
use crate::error::{CrmError, Result};
use crate::pipeline::flatten::id_text;
use serde_json::{Map, Value};

pub type FlatRecord = Map<String, Value>;

/// Which extracted records a run migrates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    /// Exact match on the text of one field
    Filter { field: String, value: String },
    /// Confirm each of the first records one by one
    Manual,
}

impl Selection {
    /// Parse a `field=value` filter argument.
    pub fn parse_filter(arg: &str) -> Result<Self> {
        match arg.split_once('=') {
            Some((field, value)) if !field.trim().is_empty() => Ok(Selection::Filter {
                field: field.trim().to_string(),
                value: value.to_string(),
            }),
            _ => Err(CrmError::Validation(format!(
                "filter '{arg}' must look like field=value"
            ))),
        }
    }
}

/// Text a filter compares against: strings as-is, everything else as JSON
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn filter_records(records: Vec<FlatRecord>, field: &str, value: &str) -> Vec<FlatRecord> {
    records
        .into_iter()
        .filter(|r| r.get(field).map_or(false, |v| field_text(v) == value))
        .collect()
}

/// Short label for a record in prompts and previews
pub fn record_label(record: &FlatRecord) -> String {
    ["name_full", "name", "email_primary", "email"]
        .iter()
        .find_map(|key| match record.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
        .unwrap_or_else(|| id_text(record.get("id")))
}

/// Apply a selection; `Manual` asks about each of the first records.
pub fn apply(selection: &Selection, records: Vec<FlatRecord>, prompter: &dyn Prompter) -> Result<Vec<FlatRecord>> {
    match selection {
        Selection::All => Ok(records),
        Selection::Filter { field, value } => {
            let filtered = filter_records(records, field, value);
            println!("Filtered to {} records.", filtered.len());
            Ok(filtered)
        }
        Selection::Manual => {
            let mut selected = Vec::new();
            for (i, record) in records.into_iter().take(MANUAL_SELECTION_LIMIT).enumerate() {
                let question = format!("Migrate record {}: {}?", i + 1, record_label(&record));
                if prompter.confirm(&question, true)? {
                    selected.push(record);
                }
            }
            Ok(selected)
        }
    }
}

/// Ask how to select records.
pub fn choose(records: &[FlatRecord], prompter: &dyn Prompter) -> Result<Selection> {
    let options = vec![
        "Migrate All".to_string(),
        "Filter by Field".to_string(),
        format!("Manual Selection (First {MANUAL_SELECTION_LIMIT})"),
    ];
    match prompter.choose("Selection Method", &options, 0)? {
        0 => Ok(Selection::All),
        1 => {
            let fields: Vec<String> = records
                .first()
                .map(|r| r.keys().cloned().collect())
                .unwrap_or_default();
            if fields.is_empty() {
                return Ok(Selection::All);
            }
            let field = fields[prompter.choose("Filter by field", &fields, 0)?].clone();
            let value = prompter.ask(&format!("Value for {field} (exact match)"), None)?;
            Ok(Selection::Filter { field, value })
        }
        _ => Ok(Selection::Manual),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn records() -> Vec<FlatRecord> {
        vec![
            json!({ "id": "1", "city": "Paris", "score": 3 }),
            json!({ "id": "2", "city": "Berlin", "score": 4 }),
            json!({ "id": "3", "city": "Paris", "name_full": "Ada" }),
        ]
        .into_iter()
        .filter_map(|v| v.as_object().cloned())
        .collect()
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            Selection::parse_filter("city=Paris").unwrap(),
            Selection::Filter { field: "city".into(), value: "Paris".into() }
        );
        assert!(Selection::parse_filter("city").is_err());
        assert!(Selection::parse_filter("=x").is_err());
    }

    #[test]
    fn test_filter_is_exact_match() {
        assert_eq!(filter_records(records(), "city", "Paris").len(), 2);
        assert_eq!(filter_records(records(), "city", "paris").len(), 0);
        assert_eq!(filter_records(records(), "score", "4").len(), 1);
    }

    #[test]
    fn test_record_label_falls_back_to_id() {
        let all = records();
        assert_eq!(record_label(&all[2]), "Ada");
        assert_eq!(record_label(&all[0]), "1");
    }
}
