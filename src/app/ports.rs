use crate::error::Result;
use crate::types::{AttributeInfo, ObjectInfo, Record, RecordId, RecordQuery};
use async_trait::async_trait;
use serde_json::Value;

/// Destination CRM (Attio). `values` arguments use Attio's write shape:
/// `{"attr": [{"value": ..}], ..}`.
#[async_trait]
pub trait CrmApi: Send + Sync {
    fn service_name(&self) -> &str;

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>>;

    async fn list_attributes(&self, object: &str) -> Result<Vec<AttributeInfo>>;

    /// One page of records. Malformed entries are dropped by the adapter.
    async fn query_records(&self, object: &str, query: &RecordQuery) -> Result<Vec<Record>>;

    async fn get_record(&self, object: &str, id: &RecordId) -> Result<Option<Record>>;

    /// Returns the new record id when the CRM reports one.
    async fn create_record(&self, object: &str, values: &Value) -> Result<Option<RecordId>>;

    /// Create or update the record matching `matching_attribute`.
    async fn upsert_record(
        &self,
        object: &str,
        matching_attribute: &str,
        values: &Value,
    ) -> Result<Option<RecordId>>;

    async fn update_record(&self, object: &str, id: &RecordId, values: &Value) -> Result<()>;

    async fn delete_record(&self, object: &str, id: &RecordId) -> Result<()>;
}

/// One page of source records plus the cursor for the next one
#[derive(Debug, Clone, Default)]
pub struct SourcePage {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// Migration source CRM (Twenty)
#[async_trait]
pub trait SourceCrm: Send + Sync {
    fn service_name(&self) -> &str;

    /// Object names the source exposes
    async fn list_objects(&self) -> Result<Vec<String>>;

    async fn fetch_page(&self, object: &str, limit: usize, cursor: Option<&str>) -> Result<SourcePage>;
}

/// Interactive questions asked on the terminal
pub trait Prompter: Send + Sync {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    /// Free-text answer; an empty reply yields `default` when one is given.
    fn ask(&self, question: &str, default: Option<&str>) -> Result<String>;

    /// Index into `choices`
    fn choose(&self, question: &str, choices: &[String], default: usize) -> Result<usize>;
}
