use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Login challenge not found on the login page")]
    ChallengeNotFound,

    #[error("Unexpected HTTP status {status} for {resource}")]
    UnexpectedStatus { resource: String, status: u16 },

    #[error("Login rejected by Speedport: {0}")]
    LoginRejected(String),

    #[error("Failed to parse {resource}: {message}")]
    Parse { resource: String, message: String },

    #[error("HTTP request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExporterError {
    pub(crate) fn parse(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
