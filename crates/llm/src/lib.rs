//! Provider plumbing: HTTP client, response-item parsing, retry policy,
//! model resolution, and usage accounting.

mod client;
mod error;
mod models;
mod retry;
mod types;
mod usage;

pub use client::LlmClient;
pub use error::{LlmError, classify_status};
pub use models::{ResolvedModels, resolve_models};
pub use retry::{Backoff, CircuitBreaker, retry_transient};
pub use types::{
    ComputerAction, ContentPart, LlmResponse, ReasoningConfig, ResponseItem, ResponseRequest,
    TextConfig, Usage,
};
pub use usage::estimate_cost;
