use crate::error::{CrmError, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Bearer-authenticated JSON client for one remote service.
///
/// Each call is a single attempt; retries are layered on top by the
/// `Retrying*` adapters so the policy lives in one place.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    service: String,
}

impl ApiClient {
    pub fn new(service: &str, base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| CrmError::Config(format!("{service} token is not a valid header value: {e}")))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service: service.to_string(),
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn url(&self, endpoint: &str) -> String {
        join_url(&self.base_url, endpoint)
    }

    pub async fn get(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Value> {
        self.send(Method::GET, endpoint, query, None).await
    }

    pub async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.send(Method::POST, endpoint, &[], Some(body)).await
    }

    pub async fn put(&self, endpoint: &str, query: &[(&str, String)], body: &Value) -> Result<Value> {
        self.send(Method::PUT, endpoint, query, Some(body)).await
    }

    pub async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.send(Method::PATCH, endpoint, &[], Some(body)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<Value> {
        self.send(Method::DELETE, endpoint, &[], None).await
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url(endpoint);
        debug!("{} {} {}", self.service, method, url);

        let mut request = self.client.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("{} responded with HTTP {} ({} bytes)", self.service, status.as_u16(), text.len());

        if !status.is_success() {
            return Err(classify_status(&self.service, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| {
            CrmError::MalformedResponse(format!("{} returned invalid JSON from {}: {}", self.service, url, e))
        })
    }
}

pub fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}

/// Turn a non-success status into the matching error kind.
pub fn classify_status(service: &str, status: StatusCode, body: &str) -> CrmError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("no response body").to_string()
    } else {
        body.trim().to_string()
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CrmError::Auth {
            service: service.to_string(),
            status: status.as_u16(),
            message,
        },
        _ => CrmError::Api {
            service: service.to_string(),
            status: status.as_u16(),
            message,
        },
    }
}
