use crate::app::ports::{CrmApi, SourceCrm, SourcePage};
use crate::error::{CrmError, Result};
use crate::retry::rate_limited;
use crate::types::{parse_attio_values, AttributeInfo, ObjectInfo, Record, RecordId, RecordQuery};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

const IN_MEMORY_SERVICE: &str = "In-memory CRM";

/// Every call made against an [`InMemoryCrm`], failed attempts included
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallLog {
    pub queries: usize,
    pub creates: usize,
    pub upserts: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl CallLog {
    pub fn mutating(&self) -> usize {
        self.creates + self.upserts + self.updates + self.deletes
    }
}

#[derive(Default)]
struct State {
    objects: Vec<ObjectInfo>,
    attributes: BTreeMap<String, Vec<AttributeInfo>>,
    records: BTreeMap<String, Vec<Record>>,
    next_id: u64,
    calls: CallLog,
    transient_write_failures: u32,
    rejected_text: Vec<String>,
    failing_deletes: HashSet<RecordId>,
    lost_delete_responses: HashSet<RecordId>,
    failing_updates: HashSet<RecordId>,
    credentials_revoked: bool,
}

/// Attio stand-in that keeps records in memory, for tests and rehearsals.
///
/// Writes are checked against declared attribute types the way Attio checks
/// them. Failure injection covers transient write failures, rejected
/// payloads, failing deletes and updates, deletes whose response is lost,
/// and revoked credentials.
pub struct InMemoryCrm {
    state: Mutex<State>,
}

impl Default for InMemoryCrm {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_object(self, slug: &str) -> Self {
        self.state().objects.push(ObjectInfo {
            api_slug: slug.to_string(),
            object_id: format!("obj-{slug}"),
            singular_noun: None,
            plural_noun: None,
        });
        self
    }

    fn push_attribute(self, object: &str, slug: &str, attribute_type: &str, is_required: bool) -> Self {
        self.state()
            .attributes
            .entry(object.to_string())
            .or_default()
            .push(AttributeInfo {
                api_slug: slug.to_string(),
                attribute_type: attribute_type.to_string(),
                is_required,
                is_multiselect: false,
            });
        self
    }

    pub fn with_required_attribute(self, object: &str, slug: &str) -> Self {
        self.push_attribute(object, slug, "text", true)
    }

    /// Declare an attribute of an Attio type (`text`, `personal-name`, `domain`, ...)
    pub fn with_attribute(self, object: &str, slug: &str, attribute_type: &str) -> Self {
        self.push_attribute(object, slug, attribute_type, false)
    }

    pub fn insert(&self, record: Record) {
        self.state()
            .records
            .entry(record.object.clone())
            .or_default()
            .push(record);
    }

    /// The next `count` create/upsert calls fail with a rate limit
    pub fn fail_writes_transiently(&self, count: u32) {
        self.state().transient_write_failures = count;
    }

    /// Writes whose payload contains `marker` are rejected with HTTP 400
    pub fn reject_writes_containing(&self, marker: &str) {
        self.state().rejected_text.push(marker.to_string());
    }

    pub fn fail_delete(&self, id: &RecordId) {
        self.state().failing_deletes.insert(id.clone());
    }

    /// The first delete of `id` removes it but answers with a gateway timeout
    pub fn lose_delete_response(&self, id: &RecordId) {
        self.state().lost_delete_responses.insert(id.clone());
    }

    pub fn fail_update(&self, id: &RecordId) {
        self.state().failing_updates.insert(id.clone());
    }

    /// Every later write is refused with HTTP 401
    pub fn revoke_credentials(&self) {
        self.state().credentials_revoked = true;
    }

    pub fn calls(&self) -> CallLog {
        self.state().calls.clone()
    }

    pub fn records(&self, object: &str) -> Vec<Record> {
        self.state().records.get(object).cloned().unwrap_or_default()
    }

    pub fn record(&self, object: &str, id: &RecordId) -> Option<Record> {
        self.records(object).into_iter().find(|r| &r.id == id)
    }

    fn check_credentials(state: &State) -> Result<()> {
        if state.credentials_revoked {
            return Err(CrmError::Auth {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 401,
                message: "invalid API token".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(state: &mut State, object: &str, values: &Value) -> Result<()> {
        Self::check_credentials(state)?;
        if state.transient_write_failures > 0 {
            state.transient_write_failures -= 1;
            return Err(rate_limited(IN_MEMORY_SERVICE));
        }
        let rendered = values.to_string();
        if let Some(marker) = state.rejected_text.iter().find(|m| rendered.contains(m.as_str())) {
            return Err(CrmError::Api {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 400,
                message: format!("value rejected: {marker}"),
            });
        }
        Self::check_shapes(state, object, values)
    }

    /// Entries of a declared attribute must carry the key its type expects.
    fn check_shapes(state: &State, object: &str, values: &Value) -> Result<()> {
        let (Some(declared), Some(incoming)) = (state.attributes.get(object), values.as_object()) else {
            return Ok(());
        };
        for attribute in declared {
            let Some(entries) = incoming.get(&attribute.api_slug).and_then(Value::as_array) else {
                continue;
            };
            let key = entry_key(&attribute.attribute_type);
            if let Some(bad) = entries.iter().find(|e| e.get(key).is_none()) {
                return Err(CrmError::Api {
                    service: IN_MEMORY_SERVICE.to_string(),
                    status: 400,
                    message: format!(
                        "{} is {} and needs '{}', got {}",
                        attribute.api_slug, attribute.attribute_type, key, bad
                    ),
                });
            }
        }
        Ok(())
    }

    fn insert_new(state: &mut State, object: &str, values: &Value) -> Result<RecordId> {
        state.next_id += 1;
        let id = RecordId::new(format!("mem-{}", state.next_id));
        let record = Record {
            id: id.clone(),
            object: object.to_string(),
            created_at: Some(base_time() + Duration::seconds(state.next_id as i64)),
            values: parse_attio_values(values)?,
        };
        debug!("In-memory create {} {}", object, id);
        state.records.entry(object.to_string()).or_default().push(record);
        Ok(id)
    }
}

fn entry_key(attribute_type: &str) -> &'static str {
    match attribute_type {
        "personal-name" => "full_name",
        "email-address" => "email_address",
        "domain" => "domain",
        "location" => "locality",
        _ => "value",
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_else(Utc::now)
}

fn sort_key(record: &Record) -> (bool, Option<DateTime<Utc>>, RecordId) {
    (record.created_at.is_none(), record.created_at, record.id.clone())
}

fn matches_filter(record: &Record, filter: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return true;
    };
    conditions.iter().all(|(attr, expected)| {
        let expected = expected.as_str().unwrap_or_default().to_lowercase();
        record
            .list(attr)
            .iter()
            .any(|v| v.to_lowercase() == expected)
    })
}

#[async_trait]
impl CrmApi for InMemoryCrm {
    fn service_name(&self) -> &str {
        IN_MEMORY_SERVICE
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        Ok(self.state().objects.clone())
    }

    async fn list_attributes(&self, object: &str) -> Result<Vec<AttributeInfo>> {
        Ok(self.state().attributes.get(object).cloned().unwrap_or_default())
    }

    async fn query_records(&self, object: &str, query: &RecordQuery) -> Result<Vec<Record>> {
        let mut state = self.state();
        state.calls.queries += 1;
        let mut records: Vec<Record> = state
            .records
            .get(object)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| query.filter.as_ref().map_or(true, |f| matches_filter(r, f)))
            .collect();
        if query.oldest_first {
            records.sort_by_key(sort_key);
        }
        let limit = if query.limit == 0 { usize::MAX } else { query.limit };
        Ok(records.into_iter().skip(query.offset).take(limit).collect())
    }

    async fn get_record(&self, object: &str, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.record(object, id))
    }

    async fn create_record(&self, object: &str, values: &Value) -> Result<Option<RecordId>> {
        let mut state = self.state();
        state.calls.creates += 1;
        Self::check_write(&mut state, object, values)?;
        Self::insert_new(&mut state, object, values).map(Some)
    }

    async fn upsert_record(
        &self,
        object: &str,
        matching_attribute: &str,
        values: &Value,
    ) -> Result<Option<RecordId>> {
        let mut state = self.state();
        state.calls.upserts += 1;
        Self::check_write(&mut state, object, values)?;
        let incoming = parse_attio_values(values)?;
        let keys: Vec<String> = incoming
            .get(matching_attribute)
            .map(|v| v.as_list())
            .unwrap_or_default()
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        let existing = state.records.get_mut(object).and_then(|records| {
            records.iter_mut().find(|r| {
                r.list(matching_attribute)
                    .iter()
                    .any(|v| keys.contains(&v.to_lowercase()))
            })
        });
        match existing {
            Some(record) => {
                record.values.extend(incoming);
                Ok(Some(record.id.clone()))
            }
            None => Self::insert_new(&mut state, object, values).map(Some),
        }
    }

    async fn update_record(&self, object: &str, id: &RecordId, values: &Value) -> Result<()> {
        let mut state = self.state();
        state.calls.updates += 1;
        Self::check_credentials(&state)?;
        if state.failing_updates.contains(id) {
            return Err(CrmError::Api {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 400,
                message: format!("record {id} cannot be updated"),
            });
        }
        let incoming = parse_attio_values(values)?;
        let record = state
            .records
            .get_mut(object)
            .and_then(|records| records.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| CrmError::Api {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 404,
                message: format!("record {id} not found"),
            })?;
        record.values.extend(incoming);
        Ok(())
    }

    async fn delete_record(&self, object: &str, id: &RecordId) -> Result<()> {
        let mut state = self.state();
        state.calls.deletes += 1;
        Self::check_credentials(&state)?;
        if state.failing_deletes.contains(id) {
            return Err(CrmError::Api {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 400,
                message: format!("record {id} cannot be deleted"),
            });
        }
        let records = state.records.entry(object.to_string()).or_default();
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(CrmError::Api {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 404,
                message: format!("record {id} not found"),
            });
        }
        if state.lost_delete_responses.remove(id) {
            return Err(CrmError::Api {
                service: IN_MEMORY_SERVICE.to_string(),
                status: 504,
                message: "gateway timeout".to_string(),
            });
        }
        Ok(())
    }
}

/// Migration source backed by a fixed list of raw records
pub struct InMemorySource {
    objects: Vec<String>,
    records: Vec<Value>,
}

impl InMemorySource {
    pub fn new(records: Vec<Value>) -> Self {
        Self {
            objects: vec!["people".to_string(), "companies".to_string()],
            records,
        }
    }
}

#[async_trait]
impl SourceCrm for InMemorySource {
    fn service_name(&self) -> &str {
        "In-memory source"
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        Ok(self.objects.clone())
    }

    async fn fetch_page(&self, _object: &str, limit: usize, cursor: Option<&str>) -> Result<SourcePage> {
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| CrmError::MalformedResponse(format!("bad cursor {c}")))?,
            None => 0,
        };
        let end = (start + limit.max(1)).min(self.records.len());
        let records = self.records.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
        let next_cursor = (end < self.records.len()).then(|| end.to_string());
        Ok(SourcePage { records, next_cursor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FieldValue;
    use serde_json::json;

    #[tokio::test]
    async fn test_create_then_query_oldest_first() {
        let crm = InMemoryCrm::new();
        crm.insert(
            Record::new("old", "companies")
                .created(Utc.timestamp_opt(10, 0).unwrap())
                .with_value("name", FieldValue::Text("Acme".into())),
        );
        let id = crm
            .create_record("companies", &json!({ "name": [{ "value": "Beta" }] }))
            .await
            .unwrap()
            .unwrap();
        let records = crm.query_records("companies", &RecordQuery::page(10, 0)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "old");
        assert_eq!(records[1].id, id);
        assert_eq!(records[1].display_name(), "Beta");
    }

    #[tokio::test]
    async fn test_upsert_matches_on_attribute() {
        let crm = InMemoryCrm::new();
        let values = json!({ "email_addresses": [{ "email_address": "a@x.com" }] });
        let first = crm.upsert_record("people", "email_addresses", &values).await.unwrap();
        let second = crm.upsert_record("people", "email_addresses", &values).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(crm.records("people").len(), 1);
        assert_eq!(crm.calls().upserts, 2);
    }

    #[tokio::test]
    async fn test_transient_failures_are_consumed() {
        let crm = InMemoryCrm::new();
        crm.fail_writes_transiently(1);
        let values = json!({ "name": [{ "value": "X" }] });
        let err = crm.create_record("companies", &values).await.unwrap_err();
        assert!(err.is_transient());
        assert!(crm.create_record("companies", &values).await.is_ok());
        assert_eq!(crm.calls().creates, 2);
    }

    #[tokio::test]
    async fn test_writes_are_checked_against_attribute_types() {
        let crm = InMemoryCrm::new().with_attribute("companies", "name", "text");
        let person_shape = json!({ "name": [{ "full_name": "Acme", "first_name": "Acme", "last_name": "" }] });
        let err = crm.create_record("companies", &person_shape).await.unwrap_err();
        assert!(matches!(err, CrmError::Api { status: 400, .. }));
        let text_shape = json!({ "name": [{ "value": "Acme" }] });
        assert!(crm.create_record("companies", &text_shape).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoked_credentials_refuse_writes() {
        let crm = InMemoryCrm::new();
        crm.insert(Record::new("a", "companies"));
        crm.revoke_credentials();
        let err = crm.delete_record("companies", &RecordId::new("a")).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(crm.records("companies").len(), 1);
    }

    #[tokio::test]
    async fn test_lost_delete_response_still_removes_the_record() {
        let crm = InMemoryCrm::new();
        let id = RecordId::new("a");
        crm.insert(Record::new("a", "companies"));
        crm.lose_delete_response(&id);
        assert!(crm.delete_record("companies", &id).await.unwrap_err().is_transient());
        assert!(crm.records("companies").is_empty());
        let again = crm.delete_record("companies", &id).await.unwrap_err();
        assert!(again.is_not_found());
    }

    #[tokio::test]
    async fn test_source_pages_by_cursor() {
        let source = InMemorySource::new((0..5).map(|i| json!({ "id": i.to_string() })).collect());
        let first = source.fetch_page("people", 2, None).await.unwrap();
        assert_eq!(first.records.len(), 2);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));
        let last = source.fetch_page("people", 2, Some("4")).await.unwrap();
        assert_eq!(last.records.len(), 1);
        assert!(last.next_cursor.is_none());
    }
}
