use thiserror::Error;

/// Failures reported by a structured or semantic store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("malformed store query: {0}")]
    QueryMalformed(String),

    #[error("store call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

/// Failures reported by the LLM caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("LLM provider rate limited the request")]
    RateLimited,

    #[error("LLM returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("LLM provider rejected the credentials")]
    Auth,

    #[error("LLM provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read '{key}': {reason}")]
    Extract { key: String, reason: String },
}

/// Outcome of one retrieval call once errors have been absorbed. Absence is a
/// routing signal, never a failure.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval<T> {
    Found(Vec<T>),
    NoResults,
    Failed(AdapterError),
}

impl<T> Retrieval<T> {
    pub fn from_result(result: Result<Vec<T>, AdapterError>) -> Self {
        match result {
            Ok(items) if items.is_empty() => Self::NoResults,
            Ok(items) => Self::Found(items),
            Err(e) => Self::Failed(e),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Found(items) => items.len(),
            Self::NoResults | Self::Failed(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn into_items(self) -> Vec<T> {
        match self {
            Self::Found(items) => items,
            Self::NoResults | Self::Failed(_) => Vec::new(),
        }
    }
}

/// The caller abandoned the request before an answer was produced.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("request cancelled by caller")]
pub struct Cancelled;
