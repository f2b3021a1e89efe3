use crate::constants::{
    ATTR_DOMAINS, ATTR_EMAIL_ADDRESSES, ATTR_JOB_TITLE, ATTR_LINKEDIN, ATTR_NAME,
    ATTR_PRIMARY_LOCATION, ATTR_TWITTER, COMPANIES, PEOPLE, SOCIAL_ATTRIBUTES,
};
use crate::error::{CrmError, Result};
use crate::pipeline::flatten::scalar_text;
use crate::types::AttributeInfo;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email pattern")
});

/// Source field name to Attio attribute slug, fixed for one migration run
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_object: String,
    pub target_object: String,
    pub fields: BTreeMap<String, String>,
}

impl FieldMapping {
    pub fn new(source_object: &str, target_object: &str) -> Self {
        Self {
            source_object: source_object.to_string(),
            target_object: target_object.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn map(mut self, source: &str, target: &str) -> Self {
        self.fields.insert(source.to_string(), target.to_string());
        self
    }

    /// Built-in mapping for targets whose Twenty shape is known
    pub fn builtin(source_object: &str, target_object: &str) -> Option<Self> {
        let mapping = Self::new(source_object, target_object);
        match target_object {
            PEOPLE => Some(
                mapping
                    .map("name_full", ATTR_NAME)
                    .map("email_primary", ATTR_EMAIL_ADDRESSES)
                    .map("jobTitle", ATTR_JOB_TITLE)
                    .map("city", ATTR_PRIMARY_LOCATION)
                    .map("linkedin_url", ATTR_LINKEDIN)
                    .map("x_url", ATTR_TWITTER),
            ),
            COMPANIES => Some(
                mapping
                    .map("name", ATTR_NAME)
                    .map("domain", ATTR_DOMAINS)
                    .map("linkedin_url", ATTR_LINKEDIN)
                    .map("x_url", ATTR_TWITTER),
            ),
            _ => None,
        }
    }

    /// Read a mapping file: either a saved [`FieldMapping`] or a bare
    /// `{"source": "target"}` object.
    pub fn load(path: &Path, source_object: &str, target_object: &str) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        if value.get("fields").map_or(false, Value::is_object) {
            return Ok(serde_json::from_value(value)?);
        }
        let pairs: BTreeMap<String, String> = serde_json::from_value(value)?;
        Ok(Self {
            source_object: source_object.to_string(),
            target_object: target_object.to_string(),
            fields: pairs,
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Every required destination attribute must be a mapping target.
    pub fn validate(&self, attributes: &[AttributeInfo]) -> Result<()> {
        if self.fields.is_empty() {
            return Err(CrmError::Validation("field mapping is empty".into()));
        }
        let missing: Vec<&str> = attributes
            .iter()
            .filter(|a| a.is_required)
            .map(|a| a.api_slug.as_str())
            .filter(|slug| !self.fields.values().any(|t| t == slug))
            .collect();
        if !missing.is_empty() {
            return Err(CrmError::Validation(format!(
                "required {} attributes not mapped: {}",
                self.target_object,
                missing.join(", ")
            )));
        }
        if !attributes.is_empty() {
            for target in self.fields.values() {
                if !attributes.iter().any(|a| &a.api_slug == target) {
                    warn!("Attio {} has no attribute '{}'", self.target_object, target);
                }
            }
        }
        Ok(())
    }

    /// Attio `values` for one flattened source record.
    ///
    /// `attributes` describes the target object; the write shape of each
    /// value follows the attribute's type. A record with nothing to write,
    /// or with a value that cannot be encoded, is a validation error.
    pub fn build_payload(
        &self,
        record: &Map<String, Value>,
        attributes: &[AttributeInfo],
    ) -> Result<Value> {
        let mut values = Map::new();
        for (source, target) in &self.fields {
            let Some(raw) = record.get(source) else {
                continue;
            };
            let kind = AttributeKind::resolve(&self.target_object, target, attributes);
            if let Some(encoded) = encode_field(kind, target, raw)? {
                values.insert(target.clone(), encoded);
            }
        }
        if values.is_empty() {
            return Err(CrmError::Validation("no mapped fields have values".into()));
        }
        Ok(Value::Object(values))
    }
}

/// Attio write shape of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    PersonalName,
    EmailAddress,
    Location,
    Domain,
    /// `[{"value": ..}]`
    Plain,
}

impl AttributeKind {
    /// Kind for an Attio attribute `type`
    pub fn from_attio_type(attribute_type: &str) -> Self {
        match attribute_type {
            "personal-name" => AttributeKind::PersonalName,
            "email-address" => AttributeKind::EmailAddress,
            "location" => AttributeKind::Location,
            "domain" => AttributeKind::Domain,
            _ => AttributeKind::Plain,
        }
    }

    /// Kind of a standard attribute when Attio did not describe it.
    /// Only people carry a personal name; a company `name` is text.
    pub fn for_slug(target_object: &str, slug: &str) -> Self {
        match slug {
            ATTR_NAME if target_object == PEOPLE => AttributeKind::PersonalName,
            ATTR_EMAIL_ADDRESSES => AttributeKind::EmailAddress,
            ATTR_PRIMARY_LOCATION => AttributeKind::Location,
            ATTR_DOMAINS => AttributeKind::Domain,
            _ => AttributeKind::Plain,
        }
    }

    pub fn resolve(target_object: &str, slug: &str, attributes: &[AttributeInfo]) -> Self {
        attributes
            .iter()
            .find(|a| a.api_slug == slug)
            .map(|a| Self::from_attio_type(&a.attribute_type))
            .unwrap_or_else(|| Self::for_slug(target_object, slug))
    }
}

/// Encode a raw JSON field. Nested values only pass through for plain attributes.
pub fn encode_field(kind: AttributeKind, attribute: &str, raw: &Value) -> Result<Option<Value>> {
    match raw {
        Value::Null => Ok(None),
        Value::Array(items) if items.is_empty() => Ok(None),
        Value::Object(_) | Value::Array(_) => {
            if is_structured(kind, attribute) {
                Err(CrmError::Validation(format!(
                    "{attribute} needs a plain value, got {raw}"
                )))
            } else {
                Ok(Some(raw.clone()))
            }
        }
        scalar => match scalar_text(scalar) {
            Some(text) => encode_value(kind, &text),
            None => Ok(None),
        },
    }
}

fn is_structured(kind: AttributeKind, attribute: &str) -> bool {
    kind != AttributeKind::Plain
        || attribute == ATTR_NAME
        || SOCIAL_ATTRIBUTES.contains(&attribute)
}

/// Attio write shape for a text value. Blank input encodes to `None`.
pub fn encode_value(kind: AttributeKind, raw: &str) -> Result<Option<Value>> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let encoded = match kind {
        AttributeKind::PersonalName => {
            let (first, last) = value.split_once(' ').unwrap_or((value, ""));
            json!([{
                "full_name": value,
                "first_name": first,
                "last_name": last.trim(),
            }])
        }
        AttributeKind::EmailAddress => {
            if !EMAIL.is_match(value) {
                return Err(CrmError::Validation(format!("invalid email address '{value}'")));
            }
            json!([{ "email_address": value }])
        }
        AttributeKind::Location => json!([{
            "line_1": "",
            "line_2": "",
            "line_3": "",
            "line_4": "",
            "locality": value,
            "region": "",
            "postcode": "",
            "country_code": null,
            "latitude": null,
            "longitude": null,
        }]),
        AttributeKind::Domain => json!([{ "domain": value.to_lowercase() }]),
        AttributeKind::Plain => json!([{ "value": value }]),
    };
    Ok(Some(encoded))
}
