use crate::app::ports::{CrmApi, SourceCrm, SourcePage};
use crate::error::Result;
use crate::retry::{with_backoff, RetryPolicy};
use crate::types::{AttributeInfo, ObjectInfo, Record, RecordId, RecordQuery};
use async_trait::async_trait;
use serde_json::Value;

/// Wraps a destination CRM so every call is retried on transient errors
pub struct RetryingCrm<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C: CrmApi> RetryingCrm<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait]
impl<C: CrmApi> CrmApi for RetryingCrm<C> {
    fn service_name(&self) -> &str {
        self.inner.service_name()
    }

    async fn list_objects(&self) -> Result<Vec<ObjectInfo>> {
        with_backoff(&self.policy, "list objects", || self.inner.list_objects()).await
    }

    async fn list_attributes(&self, object: &str) -> Result<Vec<AttributeInfo>> {
        with_backoff(&self.policy, "list attributes", || self.inner.list_attributes(object)).await
    }

    async fn query_records(&self, object: &str, query: &RecordQuery) -> Result<Vec<Record>> {
        with_backoff(&self.policy, "query records", || self.inner.query_records(object, query)).await
    }

    async fn get_record(&self, object: &str, id: &RecordId) -> Result<Option<Record>> {
        with_backoff(&self.policy, "get record", || self.inner.get_record(object, id)).await
    }

    async fn create_record(&self, object: &str, values: &Value) -> Result<Option<RecordId>> {
        with_backoff(&self.policy, "create record", || self.inner.create_record(object, values)).await
    }

    async fn upsert_record(
        &self,
        object: &str,
        matching_attribute: &str,
        values: &Value,
    ) -> Result<Option<RecordId>> {
        with_backoff(&self.policy, "upsert record", || {
            self.inner.upsert_record(object, matching_attribute, values)
        })
        .await
    }

    async fn update_record(&self, object: &str, id: &RecordId, values: &Value) -> Result<()> {
        with_backoff(&self.policy, "update record", || self.inner.update_record(object, id, values)).await
    }

    async fn delete_record(&self, object: &str, id: &RecordId) -> Result<()> {
        with_backoff(&self.policy, "delete record", || self.inner.delete_record(object, id)).await
    }
}

/// Wraps a migration source so page fetches are retried on transient errors
pub struct RetryingSource<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: SourceCrm> RetryingSource<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<S: SourceCrm> SourceCrm for RetryingSource<S> {
    fn service_name(&self) -> &str {
        self.inner.service_name()
    }

    async fn list_objects(&self) -> Result<Vec<String>> {
        with_backoff(&self.policy, "list source objects", || self.inner.list_objects()).await
    }

    async fn fetch_page(&self, object: &str, limit: usize, cursor: Option<&str>) -> Result<SourcePage> {
        with_backoff(&self.policy, "fetch source page", || {
            self.inner.fetch_page(object, limit, cursor)
        })
        .await
    }
}
