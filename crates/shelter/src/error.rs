use reqwest::StatusCode;

// Error type for engine operations
#[derive(Debug, thiserror::Error)]
pub enum ShelterError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Server returned status code {status} for {url}")]
    StatusCode { url: String, status: StatusCode },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid proxy configuration: {0}")]
    ProxyError(String),

    #[error("Install failed: {0}")]
    Install(String),

    #[error("Invalid lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("No response available for {0}")]
    NoResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ShelterError {
    /// Whether this error came from the transport rather than from local state
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            ShelterError::HttpError(_) | ShelterError::StatusCode { .. }
        )
    }
}
