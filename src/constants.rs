/// Endpoint and naming constants shared across the tools

// Remote endpoints
pub const ATTIO_API_BASE_URL: &str = "https://api.attio.com/v2";
pub const ATTIO_DASHBOARD_URL: &str = "https://app.attio.com";

// Service labels (used in logs and error messages)
pub const ATTIO_SERVICE: &str = "Attio CRM";
pub const TWENTY_SERVICE: &str = "Twenty CRM";

// Attio object slugs
pub const PEOPLE: &str = "people";
pub const COMPANIES: &str = "companies";

// Attio attribute slugs the tools read or write directly
pub const ATTR_NAME: &str = "name";
pub const ATTR_EMAIL_ADDRESSES: &str = "email_addresses";
pub const ATTR_DOMAINS: &str = "domains";
pub const ATTR_JOB_TITLE: &str = "job_title";
pub const ATTR_PRIMARY_LOCATION: &str = "primary_location";
pub const ATTR_LINKEDIN: &str = "linkedin";
pub const ATTR_TWITTER: &str = "twitter";
pub const ATTR_CREATED_AT: &str = "created_at";

/// Social attributes Attio stores as plain text
pub const SOCIAL_ATTRIBUTES: &[&str] = &["linkedin", "twitter", "facebook", "instagram", "angellist"];

// Defaults for tunables read from the environment
pub const DEFAULT_BATCH_SIZE: usize = 50;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Page size for Attio record queries
pub const ATTIO_QUERY_PAGE_SIZE: usize = 1000;

pub const DUPLICATES_REPORT_FILE: &str = "duplicates_report.txt";

/// Source objects offered when the Twenty metadata endpoint is unavailable
pub const FALLBACK_SOURCE_OBJECTS: &[&str] = &["people", "companies", "opportunities", "tasks"];

/// Twenty bookkeeping fields never offered for mapping
pub const SOURCE_SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "deletedAt", "position", "searchVector"];

/// Number of records offered for one-by-one manual selection
pub const MANUAL_SELECTION_LIMIT: usize = 50;

/// Timestamp format used in per-run artifact file names
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
