use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration: {}", .0.join(", "))]
    MissingConfig(Vec<String>),

    #[error("Authentication failed for {service} (HTTP {status}): {message}")]
    Auth {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} returned HTTP {status}: {message}")]
    Api {
        service: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Prompt failed: {0}")]
    Prompt(String),
}

impl CrmError {
    /// Errors worth another attempt: rate limits, server errors and network hiccups.
    pub fn is_transient(&self) -> bool {
        match self {
            CrmError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CrmError::Api { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, CrmError::Auth { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CrmError::Api { status: 404, .. })
    }
}

pub type Result<T> = std::result::Result<T, CrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> CrmError {
        CrmError::Api {
            service: "Attio".into(),
            status,
            message: "boom".into(),
        }
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        assert!(api(429).is_transient());
        assert!(api(408).is_transient());
        assert!(api(500).is_transient());
        assert!(api(503).is_transient());
    }

    #[test]
    fn test_client_errors_are_not_transient() {
        assert!(!api(400).is_transient());
        assert!(!api(404).is_transient());
        assert!(api(404).is_not_found());
        assert!(!api(400).is_not_found());
        assert!(!CrmError::Validation("bad email".into()).is_transient());
    }

    #[test]
    fn test_auth_is_not_retried() {
        let err = CrmError::Auth {
            service: "Attio".into(),
            status: 401,
            message: "invalid token".into(),
        };
        assert!(err.is_auth());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_missing_config_lists_every_key() {
        let err = CrmError::MissingConfig(vec!["ATTIO_API_TOKEN".into(), "TWENTY_API_KEY".into()]);
        assert_eq!(
            err.to_string(),
            "Missing configuration: ATTIO_API_TOKEN, TWENTY_API_KEY"
        );
    }
}
