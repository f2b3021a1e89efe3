pub mod attio;
pub mod http_client;
pub mod in_memory;
pub mod prompt;
pub mod retrying;
pub mod twenty;
