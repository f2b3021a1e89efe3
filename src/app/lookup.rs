//! Single-record lookups and writes against Attio.

use crate::app::ports::CrmApi;
use crate::constants::{ATTR_EMAIL_ADDRESSES, ATTR_JOB_TITLE, ATTR_LINKEDIN, PEOPLE};
use crate::error::{CrmError, Result};
use crate::pipeline::mapping::{encode_value, AttributeKind};
use crate::types::{ObjectInfo, Record, RecordId, RecordQuery};
use serde_json::{Map, Value};
use tracing::{info, instrument};

/// Fields for `create-person`
#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub name: String,
    pub email: String,
    pub job_title: Option<String>,
    pub linkedin: Option<String>,
}

impl NewPerson {
    pub fn to_values(&self) -> Result<Value> {
        if self.email.trim().is_empty() {
            return Err(CrmError::Validation("an email address is required".into()));
        }
        let mut values = Map::new();
        let mut put = |attr: &str, raw: &str| -> Result<()> {
            if let Some(encoded) = encode_value(AttributeKind::for_slug(PEOPLE, attr), raw)? {
                values.insert(attr.to_string(), encoded);
            }
            Ok(())
        };
        put(crate::constants::ATTR_NAME, &self.name)?;
        put(ATTR_EMAIL_ADDRESSES, &self.email)?;
        if let Some(title) = &self.job_title {
            put(ATTR_JOB_TITLE, title)?;
        }
        if let Some(linkedin) = &self.linkedin {
            put(ATTR_LINKEDIN, linkedin)?;
        }
        Ok(Value::Object(values))
    }
}

pub async fn list_objects(api: &dyn CrmApi) -> Result<Vec<ObjectInfo>> {
    let mut objects = api.list_objects().await?;
    objects.sort_by(|a, b| a.api_slug.cmp(&b.api_slug));
    Ok(objects)
}

#[instrument(skip(api))]
pub async fn inspect_record(api: &dyn CrmApi, object: &str, id: &str) -> Result<Record> {
    api.get_record(object, &RecordId::new(id))
        .await?
        .ok_or_else(|| CrmError::Api {
            service: api.service_name().to_string(),
            status: 404,
            message: format!("no {object} record with id {id}"),
        })
}

/// People whose email addresses include `email`
#[instrument(skip(api))]
pub async fn find_person(api: &dyn CrmApi, email: &str) -> Result<Vec<Record>> {
    let query = RecordQuery {
        limit: 50,
        offset: 0,
        oldest_first: true,
        filter: Some(serde_json::json!({ ATTR_EMAIL_ADDRESSES: email.trim() })),
    };
    api.query_records(PEOPLE, &query).await
}

/// Create the person, or update the one already holding this email address.
#[instrument(skip(api, person), fields(email = %person.email))]
pub async fn create_person(api: &dyn CrmApi, person: &NewPerson) -> Result<Option<RecordId>> {
    let values = person.to_values()?;
    let id = api.upsert_record(PEOPLE, ATTR_EMAIL_ADDRESSES, &values).await?;
    info!("Upserted person {:?}", id);
    Ok(id)
}
