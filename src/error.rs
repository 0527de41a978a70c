use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid GitHub repository URL: {0}")]
    InvalidUrl(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status of an API rejection, if this error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
