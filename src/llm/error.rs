use thiserror::Error;

/// Classified failure of a decision provider call
#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("invalid decision: {0}")]
    Validation(String),
}

impl DecisionError {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Api { .. } => "api",
            Self::Decode(_) => "decode",
            Self::Validation(_) => "validation",
        }
    }
}
