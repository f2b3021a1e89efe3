//! Flattening of Twenty composite fields into plain values.
//!
//! Twenty returns names, emails and links as nested objects. Mapping works on
//! flat keys, so each composite gains a derived sibling:
//!
//! | Twenty field                  | Flat key        |
//! |-------------------------------|-----------------|
//! | `name.firstName/lastName`     | `name_full`     |
//! | `emails.primaryEmail`         | `email_primary` |
//! | `linkedinLink.primaryLinkUrl` | `linkedin_url`  |
//! | `xLink.primaryLinkUrl`        | `x_url`         |
//! | `domainName.primaryLinkUrl`   | `domain`        |
//!
//! The original keys are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static X_PROFILE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:https?://)?(?:www\.|mobile\.)?(?:twitter|x)\.com/@?([^/?#]+)")
        .expect("valid X profile pattern")
});

static URL_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z][a-z0-9+.-]*://)?(?:www\.)?([^/?#:]+)").expect("valid host pattern")
});

/// Text of a source record id, or `unknown`
pub fn id_text(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}

/// Reduce an X/Twitter profile URL to the bare handle Attio accepts.
///
/// Anything after the first `.` is dropped, so `twitter.com/acme.com` becomes `acme`.
pub fn x_handle(raw: &str) -> String {
    let trimmed = raw.trim();
    let handle = X_PROFILE_URL
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    handle.split('.').next().unwrap_or_default().to_string()
}

/// Host part of a URL, without scheme or `www.`
pub fn bare_domain(raw: &str) -> String {
    let trimmed = raw.trim();
    URL_HOST
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| trimmed.to_lowercase())
}

fn nested_str<'a>(record: &'a Map<String, Value>, field: &str, key: &str) -> Option<&'a str> {
    record.get(field)?.as_object()?.get(key)?.as_str()
}

/// Flatten one raw Twenty record. Non-object input yields an empty map.
pub fn flatten_record(record: &Value) -> Map<String, Value> {
    let Some(raw) = record.as_object() else {
        return Map::new();
    };
    let mut flat = raw.clone();

    if let Some(name) = raw.get("name").and_then(Value::as_object) {
        let part = |key: &str| name.get(key).and_then(Value::as_str).unwrap_or_default();
        let full = format!("{} {}", part("firstName"), part("lastName"))
            .trim()
            .to_string();
        flat.insert("name_full".into(), Value::String(full));
    }
    if raw.get("emails").map_or(false, Value::is_object) {
        let primary = nested_str(raw, "emails", "primaryEmail").unwrap_or_default();
        flat.insert("email_primary".into(), Value::String(primary.to_string()));
    }
    if raw.get("linkedinLink").map_or(false, Value::is_object) {
        let url = nested_str(raw, "linkedinLink", "primaryLinkUrl").unwrap_or_default();
        flat.insert("linkedin_url".into(), Value::String(url.to_string()));
    }
    if raw.get("xLink").map_or(false, Value::is_object) {
        let url = nested_str(raw, "xLink", "primaryLinkUrl").unwrap_or_default();
        let handle = if url.trim().is_empty() {
            String::new()
        } else {
            x_handle(url)
        };
        flat.insert("x_url".into(), Value::String(handle));
    }
    if let Some(url) = nested_str(raw, "domainName", "primaryLinkUrl") {
        if !url.trim().is_empty() {
            flat.insert("domain".into(), Value::String(bare_domain(url)));
        }
    }
    flat
}

/// Plain text for a scalar JSON value; `None` for null, empty or nested values
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
