use crate::error::{CrmError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Remote identifier assigned by the CRM that owns the record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single attribute value; CRM fields are heterogeneous
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    List(Vec<String>),
    Json(Value),
}

impl FieldValue {
    /// Type a loose JSON value. Strings that parse as RFC 3339 become timestamps.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => n.as_f64().map(FieldValue::Number).unwrap_or(FieldValue::Null),
            Value::String(s) => match DateTime::parse_from_rfc3339(s) {
                Ok(ts) => FieldValue::Timestamp(ts.with_timezone(&Utc)),
                Err(_) => FieldValue::Text(s.clone()),
            },
            Value::Array(items) if items.iter().all(Value::is_string) => FieldValue::List(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            other => FieldValue::Json(other.clone()),
        }
    }

    /// First textual value, if any
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            FieldValue::List(items) => items.first().map(String::as_str),
            _ => None,
        }
    }

    /// All textual values as a list
    pub fn as_list(&self) -> Vec<String> {
        match self {
            FieldValue::Text(s) => vec![s.clone()],
            FieldValue::List(items) => items.clone(),
            _ => Vec::new(),
        }
    }
}

/// A CRM entity (Person, Company, ...) with its attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub object: String,
    pub created_at: Option<DateTime<Utc>>,
    pub values: BTreeMap<String, FieldValue>,
}

impl Record {
    pub fn new(id: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(id),
            object: object.into(),
            created_at: None,
            values: BTreeMap::new(),
        }
    }

    pub fn created(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn with_value(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn list(&self, field: &str) -> Vec<String> {
        self.get(field).map(FieldValue::as_list).unwrap_or_default()
    }

    pub fn display_name(&self) -> &str {
        self.text(crate::constants::ATTR_NAME)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown")
    }

    /// Parse one entry of an Attio `data` array.
    pub fn from_attio(object: &str, raw: &Value) -> Result<Self> {
        let id = raw
            .pointer("/id/record_id")
            .and_then(Value::as_str)
            .ok_or_else(|| CrmError::MalformedResponse("record without id.record_id".into()))?;
        let created_at = raw
            .get("created_at")
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| ts.with_timezone(&Utc));
        let values = match raw.get("values") {
            Some(v) => parse_attio_values(v)?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            id: RecordId::new(id),
            object: object.to_string(),
            created_at,
            values,
        })
    }
}

/// Keys Attio uses for the scalar inside a value object, in lookup order
const ATTIO_VALUE_KEYS: &[&str] = &[
    "full_name",
    "email_address",
    "domain",
    "value",
    "original_url",
    "locality",
    "target_record_id",
];

/// Convert an Attio `values` object (`{attr: [{..}, ..]}`) into typed fields.
pub fn parse_attio_values(values: &Value) -> Result<BTreeMap<String, FieldValue>> {
    let map = values
        .as_object()
        .ok_or_else(|| CrmError::MalformedResponse("values is not an object".into()))?;
    let mut out = BTreeMap::new();
    for (attr, entries) in map {
        let entries: Vec<&Value> = match entries {
            Value::Array(items) => items.iter().collect(),
            Value::Null => continue,
            single => vec![single],
        };
        let scalars: Vec<Value> = entries.into_iter().filter_map(attio_scalar).collect();
        let field = match scalars.as_slice() {
            [] => continue,
            [only] => FieldValue::from_json(only),
            many if many.iter().all(Value::is_string) => FieldValue::List(
                many.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            many => FieldValue::Json(Value::Array(many.to_vec())),
        };
        out.insert(attr.clone(), field);
    }
    Ok(out)
}

fn attio_scalar(entry: &Value) -> Option<Value> {
    match entry {
        Value::Object(obj) => ATTIO_VALUE_KEYS
            .iter()
            .find_map(|key| obj.get(*key).filter(|v| !v.is_null()).cloned()),
        Value::Null => None,
        other => Some(other.clone()),
    }
}

/// Attio object metadata (`GET /objects`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub api_slug: String,
    pub object_id: String,
    pub singular_noun: Option<String>,
    pub plural_noun: Option<String>,
}

/// Attio attribute metadata (`GET /objects/{slug}/attributes`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub api_slug: String,
    pub attribute_type: String,
    pub is_required: bool,
    pub is_multiselect: bool,
}

/// Paging and filtering for record queries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecordQuery {
    pub limit: usize,
    pub offset: usize,
    pub oldest_first: bool,
    /// Attio shorthand filter, e.g. `{"email_addresses": "a@b.com"}`
    pub filter: Option<Value>,
}

impl RecordQuery {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            oldest_first: true,
            filter: None,
        }
    }

    pub fn to_body(&self) -> Value {
        let mut body = serde_json::json!({
            "limit": self.limit,
            "offset": self.offset,
        });
        if self.oldest_first {
            body["sorts"] = serde_json::json!([
                { "attribute": crate::constants::ATTR_CREATED_AT, "direction": "asc" }
            ]);
        }
        if let Some(filter) = &self.filter {
            body["filter"] = filter.clone();
        }
        body
    }
}
