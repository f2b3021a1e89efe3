use crate::app::ports::CrmApi;
use crate::config::Config;
use crate::constants::ATTIO_SERVICE;
use crate::error::{CrmError, Result};
use crate::infra::http_client::ApiClient;
use crate::types::{AttributeInfo, ObjectInfo, Record, RecordId, RecordQuery};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{instrument, warn};

/// Attio REST API v2 adapter
pub struct AttioClient {
    http: ApiClient,
}

impl AttioClient {
    pub fn new(http: ApiClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let token = config.attio_token()?;
        let http = ApiClient::new(ATTIO_SERVICE, &config.attio_base_url, token, config.request_timeout)?;
        Ok(Self::new(http))
    }
}

fn data_array<'a>(response: &'a Value, what: &str) -> Result<&'a Vec<Value>> {
    response
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| CrmError::MalformedResponse(format!("{what}: response has no data array")))
}

fn written_record_id(response: &Value) -> Option<RecordId> {
    response
        .pointer("/data/id/record_id")
        .and_then(Value::as_str)
        .map(RecordId::new)
}

pub fn parse_object_info(raw: &Value) -> Option<ObjectInfo> {
    Some(ObjectInfo {
        api_slug: raw.get("api_slug")?.as_str()?.to_string(),
        object_id: raw.pointer("/id/object_id")?.as_str()?.to_string(),
        singular_noun: raw.get("singular_noun").and_then(Value::as_str).map(str::to_string),
        plural_noun: raw.get("plural_noun").and_then(Value::as_str).map(str::to_string),
    })
}

pub fn parse_attribute_info(raw: &Value) -> Option<AttributeInfo> {
    Some(AttributeInfo {
        api_slug: raw.get("api_slug")?.as_str()?.to_string(),
        attribute_type: raw.get("type").and_then(Value::as_str).unwrap_or("text").to_string(),
        is_required: raw.get("is_required").and_then(Value::as_bool).unwrap_or(false),
        is_multiselect: raw.get("is_multiselect").and_then(Value::as_bool).unwrap_or(false),
    })
}

#[async_trait]
impl CrmApi for AttioClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        let response = self.http.get("/objects", &[]).await?;
        let objects = data_array(&response, "list objects")?
            .iter()
            .filter_map(|raw| {
                let parsed = parse_object_info(raw);
                if parsed.is_none() {
                    warn!("Skipping malformed object entry: {}", raw);
                }
                parsed
            })
            .collect();
        Ok(objects)
    }

    async fn list_attributes(&self, object: &str) -> Result<Vec<AttributeInfo>> {
        let response = self
            .http
            .get(&format!("/objects/{object}/attributes"), &[])
            .await?;
        Ok(data_array(&response, "list attributes")?
            .iter()
            .filter_map(parse_attribute_info)
            .collect())
    }

    #[instrument(skip(self, query), fields(limit = query.limit, offset = query.offset))]
    async fn query_records(&self, object: &str, query: &RecordQuery) -> Result<Vec<Record>> {
        let response = self
            .http
            .post(&format!("/objects/{object}/records/query"), &query.to_body())
            .await?;
        let mut records = Vec::new();
        for raw in data_array(&response, "query records")? {
            match Record::from_attio(object, raw) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed {} record: {}", object, e),
            }
        }
        Ok(records)
    }

    async fn get_record(&self, object: &str, id: &RecordId) -> Result<Option<Record>> {
        match self
            .http
            .get(&format!("/objects/{object}/records/{id}"), &[])
            .await
        {
            Ok(response) => {
                let raw = response
                    .get("data")
                    .ok_or_else(|| CrmError::MalformedResponse("get record: no data".into()))?;
                Ok(Some(Record::from_attio(object, raw)?))
            }
            Err(CrmError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_record(&self, object: &str, values: &Value) -> Result<Option<RecordId>> {
        let body = json!({ "data": { "values": values } });
        let response = self
            .http
            .post(&format!("/objects/{object}/records"), &body)
            .await?;
        Ok(written_record_id(&response))
    }

    async fn upsert_record(
        &self,
        object: &str,
        matching_attribute: &str,
        values: &Value,
    ) -> Result<Option<RecordId>> {
        let body = json!({ "data": { "values": values } });
        let response = self
            .http
            .put(
                &format!("/objects/{object}/records"),
                &[("matching_attribute", matching_attribute.to_string())],
                &body,
            )
            .await?;
        Ok(written_record_id(&response))
    }

    async fn update_record(&self, object: &str, id: &RecordId, values: &Value) -> Result<()> {
        let body = json!({ "data": { "values": values } });
        self.http
            .patch(&format!("/objects/{object}/records/{id}"), &body)
            .await?;
        Ok(())
    }

    async fn delete_record(&self, object: &str, id: &RecordId) -> Result<()> {
        self.http
            .delete(&format!("/objects/{object}/records/{id}"))
            .await?;
        Ok(())
    }
}
