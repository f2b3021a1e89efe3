pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod retry;
pub mod summary;
pub mod types;

// Use cases and the ports they depend on
pub mod app;
// Adapters behind the ports
pub mod infra;
// Twenty → Attio migration
pub mod pipeline;
