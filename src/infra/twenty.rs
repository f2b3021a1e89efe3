use crate::app::ports::{SourceCrm, SourcePage};
use crate::config::Config;
use crate::constants::{FALLBACK_SOURCE_OBJECTS, TWENTY_SERVICE};
use crate::error::{CrmError, Result};
use crate::infra::http_client::ApiClient;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

/// Twenty CRM REST adapter (migration source)
pub struct TwentyClient {
    http: ApiClient,
}

impl TwentyClient {
    pub fn new(http: ApiClient) -> Self {
        Self { http }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate_migration()?;
        let base_url = config.twenty_base_url.as_deref().unwrap_or_default();
        let key = config.twenty_api_key.as_deref().unwrap_or_default();
        let http = ApiClient::new(TWENTY_SERVICE, base_url, key, config.request_timeout)?;
        Ok(Self::new(http))
    }
}

/// Records out of a `/rest/{object}` response: `data` is either the list
/// itself or an object keyed by the object name.
pub fn page_records(response: &Value, object: &str) -> Vec<Value> {
    match response.get("data") {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Object(map)) => map
            .get(object)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Cursor for the following page, from `meta.next_cursor` or `pageInfo`.
pub fn next_cursor(response: &Value) -> Option<String> {
    if let Some(cursor) = response.pointer("/meta/next_cursor").and_then(Value::as_str) {
        return Some(cursor.to_string());
    }
    let page_info = response
        .get("pageInfo")
        .or_else(|| response.pointer("/data/pageInfo"))?;
    let has_next = page_info
        .get("hasNextPage")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !has_next {
        return None;
    }
    page_info
        .get("endCursor")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl SourceCrm for TwentyClient {
    fn service_name(&self) -> &str {
        self.http.service()
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        match self.http.get("/rest/metadata/objects", &[]).await {
            Ok(response) => {
                let names: Vec<String> = page_records(&response, "objects")
                    .iter()
                    .filter_map(|obj| {
                        obj.get("namePlural")
                            .or_else(|| obj.get("name"))
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .collect();
                if names.is_empty() {
                    debug!("Twenty metadata listed no objects, using defaults");
                    Ok(fallback_objects())
                } else {
                    Ok(names)
                }
            }
            Err(e) if e.is_auth() => Err(e),
            Err(e) => {
                warn!("Could not list Twenty objects ({}), using defaults", e);
                Ok(fallback_objects())
            }
        }
    }

    async fn fetch_page(&self, object: &str, limit: usize, cursor: Option<&str>) -> Result<SourcePage> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = cursor {
            query.push(("starting_after", cursor.to_string()));
        }
        let response = self.http.get(&format!("/rest/{object}"), &query).await?;
        if response.get("data").is_none() {
            return Err(CrmError::MalformedResponse(format!(
                "{} /rest/{} response has no data",
                TWENTY_SERVICE, object
            )));
        }
        Ok(SourcePage {
            records: page_records(&response, object),
            next_cursor: next_cursor(&response),
        })
    }
}

fn fallback_objects() -> Vec<String> {
    FALLBACK_SOURCE_OBJECTS.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_records_nested_under_object_name() {
        let response = json!({ "data": { "people": [{ "id": "1" }, { "id": "2" }] } });
        assert_eq!(page_records(&response, "people").len(), 2);
        assert!(page_records(&response, "companies").is_empty());
    }

    #[test]
    fn test_page_records_flat_list() {
        let response = json!({ "data": [{ "id": "1" }] });
        assert_eq!(page_records(&response, "people").len(), 1);
    }

    #[test]
    fn test_next_cursor_from_meta() {
        let response = json!({ "data": [], "meta": { "next_cursor": "abc" } });
        assert_eq!(next_cursor(&response).as_deref(), Some("abc"));
        let done = json!({ "data": [], "meta": { "next_cursor": null } });
        assert_eq!(next_cursor(&done), None);
    }

    #[test]
    fn test_next_cursor_from_page_info() {
        let more = json!({ "data": {}, "pageInfo": { "hasNextPage": true, "endCursor": "c2" } });
        assert_eq!(next_cursor(&more).as_deref(), Some("c2"));
        let last = json!({ "data": {}, "pageInfo": { "hasNextPage": false, "endCursor": "c3" } });
        assert_eq!(next_cursor(&last), None);
    }
}
