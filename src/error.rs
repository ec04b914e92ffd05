use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Account source error: {0}")]
    Accounts(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error on {endpoint} (status {status}): {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },

    #[error("Endpoint drift detected on {endpoint}, refusing to continue")]
    EndpointDrift { endpoint: String },

    #[error("Other error: {0}")]
    Other(String),
}

impl BotError {
    /// Only a changed response contract stops the whole run.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, BotError::EndpointDrift { .. })
    }

    pub fn malformed(endpoint: &str, reason: impl Into<String>) -> Self {
        BotError::Malformed {
            endpoint: endpoint.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
