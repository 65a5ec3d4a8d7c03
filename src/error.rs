use thiserror::Error;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Extraction error: {0}")]
    Extract(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Sheets API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl SyncError {
    /// Quota rejection from the remote API (HTTP 429 or a quota message).
    pub fn is_rate_limit(&self) -> bool {
        match self {
            SyncError::RateLimited(_) => true,
            SyncError::Api { status, message } => {
                *status == 429 || message.to_lowercase().contains("quota")
            }
            _ => false,
        }
    }

    /// The remote rejected the request because the target state does not
    /// exist (no rule at that index, no merge in that region).
    pub fn is_structural(&self) -> bool {
        matches!(self, SyncError::Api { status, .. } if *status == 400 || *status == 404)
    }
}
