use thiserror::Error;

use crate::storage::StoreError;

/// Flat error taxonomy shared by every TokiTask operation.
///
/// Each variant maps to one short, user-facing message via
/// [`TokiError::user_message`]; the `Display` text keeps the technical detail
/// for logs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokiError {
    /// Transport failure talking to a remote service.
    #[error("network error: {0}")]
    Network(String),
    /// Missing or invalid configuration (API key, model, paths).
    #[error("configuration error: {0}")]
    Config(String),
    /// Remote service rejected our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// Input or reply did not satisfy a domain rule.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Document store failure.
    #[error("store error: {0}")]
    Store(String),
    /// The schedule agent failed or returned something unusable.
    #[error("agent error: {0}")]
    Agent(String),
    /// Referenced task or template does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Another schedule sync is already in flight.
    #[error("a schedule sync is already running")]
    Busy,
    /// Local state changed while a sync was in flight; the reply was discarded.
    #[error("tasks changed while the schedule was being computed")]
    Conflict,
}

impl TokiError {
    /// One-line message suitable for a notification.
    pub fn user_message(&self) -> String {
        match self {
            TokiError::Network(_) => {
                "Could not reach the service. Check your connection and try again.".to_string()
            }
            TokiError::Config(detail) => format!("TokiTask is not configured: {detail}."),
            TokiError::Auth(_) => "The AI service rejected your API key.".to_string(),
            TokiError::Validation(detail) => capitalize(detail),
            TokiError::Store(_) => "Your tasks could not be saved. Nothing was changed.".to_string(),
            TokiError::Agent(_) => {
                "The AI planner returned an unusable answer. Your tasks are unchanged.".to_string()
            }
            TokiError::NotFound(what) => format!("Could not find {what}."),
            TokiError::Busy => "A schedule update is already running.".to_string(),
            TokiError::Conflict => {
                "Your tasks changed while planning; run the planner again.".to_string()
            }
        }
    }
}

impl From<StoreError> for TokiError {
    fn from(err: StoreError) -> Self {
        TokiError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for TokiError {
    fn from(err: serde_json::Error) -> Self {
        TokiError::Store(format!("document encoding: {err}"))
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
