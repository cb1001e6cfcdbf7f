use std::time::Duration;

use reqwest::StatusCode;

// Error type shared by every gateway component
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Server returned status code {status} for {url}")]
    StatusCode { url: String, status: StatusCode },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Network unreachable for {0}")]
    Offline(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TLS configuration error: {0}")]
    TlsError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Lifecycle error: {0}")]
    LifecycleError(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
